//! The sync service.
//!
//! A single task owns the [`SyncEngine`] and is the only place it is mutated.
//! It multiplexes three event sources: requests from [`SyncHandle`]s,
//! reachability transitions, and remote calls in flight. Every engine effect
//! is carried out here and its outcome fed back into the engine. After each
//! event that changed engine state, a snapshot is written to the blob store.

use crate::error::{ClientError, Result};
use crate::remote::{self, RemoteItemStore};
use crate::storage::{self, BlobStore};
use crate::now_millis;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use swizil_engine::{
    Completion, DrainReport, Effect, EngineSnapshot, Item, ItemFields, ItemId, RemoteCall,
    RemoteOperation, RemoteOperationError, SyncEngine, SyncStatus,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const REQUEST_BUFFER: usize = 64;

#[derive(Debug)]
enum Request {
    Create {
        fields: ItemFields,
        reply: oneshot::Sender<ItemId>,
    },
    Update {
        item: Item,
        reply: oneshot::Sender<()>,
    },
    Delete {
        id: ItemId,
        reply: oneshot::Sender<()>,
    },
    Fetch {
        reply: oneshot::Sender<Result<()>>,
    },
    Sync {
        reply: oneshot::Sender<Result<DrainReport>>,
    },
    Items {
        reply: oneshot::Sender<Vec<Item>>,
    },
    Status {
        reply: oneshot::Sender<SyncStatus>,
    },
    Export {
        reply: oneshot::Sender<EngineSnapshot>,
    },
}

/// A settled remote call and the drain call it answers, if any.
struct Settled {
    call: Option<RemoteCall>,
    completion: Completion,
}

enum Event {
    Request(Request),
    /// `false` once the reachability source is gone
    Connectivity(bool),
    Settled(Settled),
}

/// Owns the engine and performs its effects.
pub struct SyncService {
    engine: SyncEngine,
    remote: Arc<dyn RemoteItemStore>,
    blobs: Arc<dyn BlobStore>,
    connectivity: watch::Receiver<bool>,
    requests: mpsc::Receiver<Request>,
    in_flight: FuturesUnordered<BoxFuture<'static, Settled>>,
    sync_waiters: Vec<oneshot::Sender<Result<DrainReport>>>,
    fetch_waiters: Vec<oneshot::Sender<Result<()>>>,
    status: watch::Sender<SyncStatus>,
    dirty: bool,
}

impl SyncService {
    /// Create a service around an engine.
    pub fn new(
        engine: SyncEngine,
        remote: Arc<dyn RemoteItemStore>,
        blobs: Arc<dyn BlobStore>,
        connectivity: watch::Receiver<bool>,
    ) -> (Self, SyncHandle) {
        let (requests_tx, requests) = mpsc::channel(REQUEST_BUFFER);
        let (status, status_rx) = watch::channel(engine.status());

        let service = Self {
            engine,
            remote,
            blobs,
            connectivity,
            requests,
            in_flight: FuturesUnordered::new(),
            sync_waiters: Vec::new(),
            fetch_waiters: Vec::new(),
            status,
            dirty: false,
        };
        let handle = SyncHandle {
            requests: requests_tx,
            status: status_rx,
        };
        (service, handle)
    }

    /// Create a service from the persisted snapshot, or empty if none exists.
    pub async fn restore(
        remote: Arc<dyn RemoteItemStore>,
        blobs: Arc<dyn BlobStore>,
        connectivity: watch::Receiver<bool>,
    ) -> Result<(Self, SyncHandle)> {
        let engine = match storage::load_snapshot(blobs.as_ref()).await? {
            Some(snapshot) => SyncEngine::from_snapshot(snapshot)?,
            None => SyncEngine::new(),
        };
        Ok(Self::new(engine, remote, blobs, connectivity))
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<SyncEngine> {
        tokio::spawn(self.run())
    }

    /// Process events until every [`SyncHandle`] is dropped.
    ///
    /// A drain still running at that point is finished first. Returns the
    /// final engine state after it has been persisted.
    pub async fn run(mut self) -> SyncEngine {
        let connected = *self.connectivity.borrow_and_update();
        let effects = self.engine.set_connected(connected, now_millis());
        self.perform(effects);
        self.publish().await;

        let mut watching = true;
        loop {
            let event = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => break,
                },
                changed = self.connectivity.changed(), if watching => Event::Connectivity(changed.is_ok()),
                Some(settled) = self.in_flight.next() => Event::Settled(settled),
            };

            match event {
                Event::Request(request) => self.handle(request),
                Event::Connectivity(true) => {
                    let connected = *self.connectivity.borrow_and_update();
                    let effects = self.engine.set_connected(connected, now_millis());
                    self.dirty = true;
                    self.perform(effects);
                }
                Event::Connectivity(false) => {
                    tracing::debug!("reachability source closed");
                    watching = false;
                }
                Event::Settled(settled) => self.on_settled(settled),
            }
            self.publish().await;
        }

        while let Some(settled) = self.in_flight.next().await {
            self.on_settled(settled);
        }
        self.dirty = true;
        self.publish().await;

        tracing::info!("sync service stopped");
        self.engine
    }

    fn handle(&mut self, request: Request) {
        let now = now_millis();
        match request {
            Request::Create { fields, reply } => {
                let (id, effects) = self.engine.create(fields, now);
                let _ = reply.send(id);
                self.dirty = true;
                self.perform(effects);
            }
            Request::Update { item, reply } => {
                let effects = self.engine.update(item, now);
                let _ = reply.send(());
                self.dirty = true;
                self.perform(effects);
            }
            Request::Delete { id, reply } => {
                let effects = self.engine.delete(id, now);
                let _ = reply.send(());
                self.dirty = true;
                self.perform(effects);
            }
            Request::Fetch { reply } => {
                if !self.engine.is_connected() {
                    let _ = reply.send(Err(ClientError::Offline));
                    return;
                }
                self.fetch_waiters.push(reply);
                let effects = self.engine.fetch();
                self.perform(effects);
            }
            Request::Sync { reply } => {
                if !self.engine.is_connected() {
                    let _ = reply.send(Err(ClientError::Offline));
                    return;
                }
                // Answered by the next drain to finish, which may be one
                // already running.
                self.sync_waiters.push(reply);
                let effects = self.engine.sync(now);
                self.perform(effects);
            }
            Request::Items { reply } => {
                let _ = reply.send(self.engine.items().to_vec());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.engine.status());
            }
            Request::Export { reply } => {
                let _ = reply.send(self.engine.export_state());
            }
        }
    }

    fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.dirty = true;
            match effect {
                Effect::Remote { call } => {
                    let remote = Arc::clone(&self.remote);
                    self.in_flight.push(
                        async move {
                            let completion = remote::perform(remote.as_ref(), &call).await;
                            Settled {
                                call: Some(call),
                                completion,
                            }
                        }
                        .boxed(),
                    );
                }
                Effect::Fetch => {
                    let remote = Arc::clone(&self.remote);
                    self.in_flight.push(
                        async move {
                            Settled {
                                call: None,
                                completion: remote::fetch(remote.as_ref()).await,
                            }
                        }
                        .boxed(),
                    );
                }
                Effect::DrainFinished { report } => {
                    match &report.error {
                        Some(error) => tracing::warn!(
                            error = %error,
                            completed = report.completed_calls,
                            "drain stopped; remaining changes stay queued"
                        ),
                        None => tracing::info!(
                            resolved = report.result.len(),
                            completed = report.completed_calls,
                            "drain finished"
                        ),
                    }
                    for waiter in self.sync_waiters.drain(..) {
                        let _ = waiter.send(Ok(report.clone()));
                    }
                }
            }
        }
    }

    fn on_settled(&mut self, settled: Settled) {
        let Settled { call, completion } = settled;
        let fetch_outcome: Option<std::result::Result<(), RemoteOperationError>> = match &completion
        {
            Completion::Fetched { .. } => Some(Ok(())),
            Completion::Failed { error } if error.operation == RemoteOperation::Fetch => {
                Some(Err(error.clone()))
            }
            _ => None,
        };

        let now = now_millis();
        match self.engine.settle(completion, now) {
            Ok(effects) => self.perform(effects),
            Err(err) => {
                tracing::error!(error = %err, "remote reply rejected");
                // Stop the drain so its entries are re-queued.
                if let Some(call) = call {
                    match self.engine.settle(call.failed(err.to_string()).into(), now) {
                        Ok(effects) => self.perform(effects),
                        Err(err) => tracing::error!(error = %err, "could not stop drain"),
                    }
                }
            }
        }
        self.dirty = true;

        if let Some(outcome) = fetch_outcome {
            for waiter in self.fetch_waiters.drain(..) {
                let _ = waiter.send(outcome.clone().map_err(ClientError::from));
            }
        }
    }

    /// Broadcast the status and persist if anything changed.
    async fn publish(&mut self) {
        let status = self.engine.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if !self.dirty {
            return;
        }
        self.dirty = false;

        let snapshot = self.engine.export_state();
        if let Err(err) = storage::save_snapshot(self.blobs.as_ref(), &snapshot).await {
            tracing::warn!(error = %err, "failed to persist state");
        }
    }
}

/// Cloneable handle for talking to a running [`SyncService`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| ClientError::ServiceStopped)?;
        rx.await.map_err(|_| ClientError::ServiceStopped)
    }

    /// Create an item; returns its temporary identifier.
    pub async fn create(&self, fields: ItemFields) -> Result<ItemId> {
        self.call(|reply| Request::Create { fields, reply }).await
    }

    pub async fn update(&self, item: Item) -> Result<()> {
        self.call(|reply| Request::Update { item, reply }).await
    }

    pub async fn delete(&self, id: ItemId) -> Result<()> {
        self.call(|reply| Request::Delete { id, reply }).await
    }

    /// Reload the item list from the remote store.
    pub async fn fetch(&self) -> Result<()> {
        self.call(|reply| Request::Fetch { reply }).await?
    }

    /// Drain the queue and wait for the drain to finish.
    ///
    /// A drain that stops on a remote failure still yields `Ok`; check
    /// [`DrainReport::is_success`].
    pub async fn sync(&self) -> Result<DrainReport> {
        self.call(|reply| Request::Sync { reply }).await?
    }

    pub async fn items(&self) -> Result<Vec<Item>> {
        self.call(|reply| Request::Items { reply }).await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        self.call(|reply| Request::Status { reply }).await
    }

    pub async fn export(&self) -> Result<EngineSnapshot> {
        self.call(|reply| Request::Export { reply }).await
    }

    /// Status updates, published after every change.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}
