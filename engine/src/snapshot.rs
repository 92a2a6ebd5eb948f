//! Snapshot types for persisting and restoring engine state.
//!
//! Only items and pending mutations are persisted. Connectivity, the drain in
//! progress and the last error are transient and start fresh after a restore.

use crate::{error::Result, Error, Item, ItemId, QueueSnapshot, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn default_next_temp_id() -> u64 {
    1
}

/// A point-in-time snapshot of the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Items in display order
    pub items: Vec<Item>,
    #[serde(default)]
    pub pending_create: Vec<Item>,
    #[serde(default)]
    pub pending_update: Vec<Item>,
    #[serde(default)]
    pub pending_delete: Vec<ItemId>,
    /// Counter of the temporary identifier allocator
    #[serde(default = "default_next_temp_id")]
    pub next_temp_id: u64,
    #[serde(default)]
    pub last_fetched: Option<Timestamp>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            items: Vec::new(),
            pending_create: Vec::new(),
            pending_update: Vec::new(),
            pending_delete: Vec::new(),
            next_temp_id: default_next_temp_id(),
            last_fetched: None,
        }
    }

    /// The pending mutations as a queue snapshot.
    pub fn queue(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending_create: self.pending_create.clone(),
            pending_update: self.pending_update.clone(),
            pending_delete: self.pending_delete.clone(),
        }
    }

    /// Total number of pending mutations.
    pub fn pending_count(&self) -> usize {
        self.pending_create.len() + self.pending_update.len() + self.pending_delete.len()
    }

    /// Check structural invariants.
    ///
    /// Item identifiers must be unique and every pending create must carry a
    /// temporary identifier.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(&item.id) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate item id: {}",
                    item.id
                )));
            }
        }

        if let Some(item) = self.pending_create.iter().find(|i| i.id.is_canonical()) {
            return Err(Error::InvalidSnapshot(format!(
                "pending create has canonical id: {}",
                item.id
            )));
        }

        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Summary of a snapshot, for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub item_count: usize,
    pub pending_count: usize,
    pub last_fetched: Option<Timestamp>,
}

impl From<&EngineSnapshot> for SnapshotMetadata {
    fn from(snapshot: &EngineSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            item_count: snapshot.items.len(),
            pending_count: snapshot.pending_count(),
            last_fetched: snapshot.last_fetched,
        }
    }
}
