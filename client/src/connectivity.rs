//! Network reachability signal.
//!
//! The host feeds reachability into a [`Connectivity`]; the sync service
//! watches it. Repeated values are swallowed so subscribers only wake on
//! actual transitions.

use tokio::sync::watch;

/// Observable boolean reachability.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        Self { tx }
    }

    /// Report the current reachability. Returns whether it changed.
    pub fn set(&self, connected: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            tracing::debug!(connected, "reachability changed");
        }
        changed
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe to transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(false)
    }
}
