//! Swizil Client - drives the sync engine against a REST item store.
//!
//! The engine in `swizil-engine` is pure; this crate supplies its
//! collaborators: an HTTP [`remote::RemoteItemStore`], a file-backed
//! [`storage::BlobStore`], a [`connectivity::Connectivity`] signal, and the
//! [`service::SyncService`] task that ties them together.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod remote;
pub mod service;
pub mod storage;

pub use config::{Config, ConfigError};
pub use connectivity::Connectivity;
pub use error::{ClientError, Result};
pub use remote::{HttpItemStore, RemoteItemStore};
pub use service::{SyncHandle, SyncService};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore};

use swizil_engine::Timestamp;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
