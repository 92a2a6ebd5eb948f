//! # Swizil Engine
//!
//! A deterministic offline-first sync engine for a list of items.
//!
//! This crate holds the client-side state of an item list backed by a remote
//! REST store: the items themselves, a queue of mutations made while offline,
//! and the logic that drains that queue against the remote store once
//! connectivity returns. Items created offline carry temporary identifiers
//! that are rewritten to canonical ones as the remote store confirms them.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches the network, disk or clock; it
//!   returns [`Effect`]s and is told their outcome as [`Completion`]s
//! - **Deterministic**: the same inputs always produce the same state
//! - **Local first**: every edit is visible immediately, online or not
//!
//! ## Core Concepts
//!
//! ### Identifiers
//!
//! An [`ItemId`] is either canonical (assigned by the remote store) or
//! temporary (`temp-N`, assigned locally by a [`TempIdAllocator`]).
//!
//! ### Mutation Queue
//!
//! The [`MutationQueue`] holds pending creates, updates and deletes. Deleting
//! an item whose create was never sent cancels both; editing it folds the
//! edit into the pending create.
//!
//! ### Drain
//!
//! A [`Drain`] replays one queue snapshot against the remote store: creates,
//! then updates, then deletes, strictly one call at a time. Later calls in the
//! same drain see identifiers resolved by earlier creates. A failure stops the
//! drain and re-queues everything not yet confirmed.
//!
//! ## Quick Start
//!
//! ```rust
//! use swizil_engine::{Completion, Effect, Item, ItemFields, ItemId, RemoteCall, SyncEngine};
//!
//! let mut engine = SyncEngine::new();
//!
//! // Offline: the item is visible right away under a temporary id.
//! let (temp_id, effects) = engine.create(ItemFields::new("Groceries", "milk", 1), 1000);
//! assert!(temp_id.is_temporary());
//! assert!(effects.is_empty());
//!
//! // Reconnect: the queued create goes out.
//! let effects = engine.set_connected(true, 2000);
//! let Effect::Remote { call: RemoteCall::Create { fields, .. } } = &effects[0] else {
//!     panic!("expected a create");
//! };
//!
//! // The remote store assigns id 101.
//! let created = Item::new(ItemId::canonical("101"), fields.clone());
//! engine.settle(Completion::Created { item: created }, 2100).unwrap();
//!
//! assert_eq!(engine.items()[0].id, ItemId::canonical("101"));
//! assert_eq!(engine.status().pending_changes, 0);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for use from other
//! languages. All data is exchanged as JSON strings.
//!
//! ## Persistence
//!
//! Use [`SyncEngine::export_state`] and [`SyncEngine::import_state`] with
//! [`EngineSnapshot`] for persistence.

pub mod drain;
pub mod error;
pub mod ffi;
pub mod id;
pub mod item;
pub mod queue;
pub mod repository;
pub mod snapshot;
pub mod sync;

// Re-export main types at crate root
pub use drain::{Drain, DrainReport, Rekey, RemoteCall, RemoteReply, SyncResult};
pub use error::{Error, RemoteOperation, RemoteOperationError};
pub use id::{ItemId, TempIdAllocator, TEMP_PREFIX};
pub use item::{Item, ItemFields};
pub use queue::{DeleteDisposition, MutationQueue, QueueSnapshot};
pub use repository::ItemRepository;
pub use snapshot::{EngineSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use sync::{Command, Completion, Effect, FetchStatus, SyncEngine, SyncStatus};

/// Type aliases for clarity
pub type UserId = i64;
pub type Timestamp = u64;
