//! Offline mutation queue.
//!
//! Three ordered lists of mutations not yet applied to the remote item store.
//! Order within each list is user action order. The queue enforces two rules
//! at enqueue time:
//!
//! - **Cancellation**: deleting an item whose create is still queued removes
//!   the create (and any queued updates); a temporary identifier is then not
//!   queued for deletion at all, since the remote store never knew about it.
//! - **Fold**: editing an item whose create is still queued refreshes the
//!   create's fields, so the create always carries the latest edit.

use crate::{Item, ItemFields, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A plain copy of the queue's three lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Items with temporary identifiers awaiting remote creation
    pub pending_create: Vec<Item>,
    /// Latest local edits awaiting remote update
    pub pending_update: Vec<Item>,
    /// Identifiers awaiting remote deletion
    pub pending_delete: Vec<ItemId>,
}

impl QueueSnapshot {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.pending_create.len() + self.pending_update.len() + self.pending_delete.len()
    }

    /// Check if all three lists are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What `enqueue_delete` did with the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDisposition {
    /// A queued create was cancelled; nothing will reach the remote store.
    Cancelled,
    /// The identifier was queued for remote deletion.
    Queued,
    /// The identifier was already queued for deletion.
    AlreadyQueued,
}

/// The offline mutation queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationQueue {
    pending_create: Vec<Item>,
    pending_update: Vec<Item>,
    pending_delete: Vec<ItemId>,
}

impl MutationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a create for an item carrying a temporary identifier.
    ///
    /// An item is created at most once: a second create for the same
    /// identifier replaces the queued fields instead of adding an entry.
    pub fn enqueue_create(&mut self, item: Item) {
        debug_assert!(item.id.is_temporary(), "creates carry temporary ids");

        match self.pending_create.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => self.pending_create.push(item),
        }
    }

    /// Queue an update. Several updates for one identifier may be queued;
    /// they are sent in order so the last one wins remotely.
    pub fn enqueue_update(&mut self, item: Item) {
        if let Some(create) = self.pending_create.iter_mut().find(|i| i.id == item.id) {
            create.set_fields(item.fields());
        }
        self.pending_update.push(item);
    }

    /// Queue a delete, applying the cancellation rule.
    pub fn enqueue_delete(&mut self, id: ItemId) -> DeleteDisposition {
        let before = self.pending_create.len();
        self.pending_create.retain(|i| i.id != id);
        let cancelled = self.pending_create.len() != before;

        self.pending_update.retain(|i| i.id != id);

        if cancelled && id.is_temporary() {
            return DeleteDisposition::Cancelled;
        }
        if self.pending_delete.contains(&id) {
            return DeleteDisposition::AlreadyQueued;
        }
        self.pending_delete.push(id);
        DeleteDisposition::Queued
    }

    /// Copy of the current contents. Does not clear the queue.
    pub fn drain_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending_create: self.pending_create.clone(),
            pending_update: self.pending_update.clone(),
            pending_delete: self.pending_delete.clone(),
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.pending_create.clear();
        self.pending_update.clear();
        self.pending_delete.clear();
    }

    /// Rewrite residual references to a temporary identifier that has just
    /// been resolved to a canonical one.
    pub fn rekey(&mut self, temp_id: &ItemId, real_id: &ItemId) {
        // The create for `temp_id` has happened; it must never be sent again.
        self.pending_create.retain(|i| &i.id != temp_id);

        for item in &mut self.pending_update {
            if &item.id == temp_id {
                item.id = real_id.clone();
            }
        }
        for id in &mut self.pending_delete {
            if id == temp_id {
                *id = real_id.clone();
            }
        }
        self.dedupe_deletes();
    }

    /// Put the unprocessed remainder of a drain back in front of the entries
    /// queued since the drain started.
    pub fn restore(&mut self, remainder: QueueSnapshot) {
        let QueueSnapshot {
            mut pending_create,
            mut pending_update,
            mut pending_delete,
        } = remainder;

        pending_create.append(&mut self.pending_create);
        pending_update.append(&mut self.pending_update);
        pending_delete.append(&mut self.pending_delete);

        self.pending_create = pending_create;
        self.pending_update = pending_update;
        self.pending_delete = pending_delete;
        self.normalize();
    }

    /// Re-apply the cancellation and fold rules across all entries.
    fn normalize(&mut self) {
        self.dedupe_deletes();
        let deleted: HashSet<ItemId> = self.pending_delete.iter().cloned().collect();

        // Updates are never sent for an identifier queued for deletion.
        self.pending_update.retain(|i| !deleted.contains(&i.id));

        let cancelled: HashSet<ItemId> = self
            .pending_create
            .iter()
            .filter(|i| deleted.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();
        if !cancelled.is_empty() {
            self.pending_create.retain(|i| !cancelled.contains(&i.id));
            self.pending_delete
                .retain(|id| !(id.is_temporary() && cancelled.contains(id)));
        }

        let mut seen = HashSet::with_capacity(self.pending_create.len());
        self.pending_create.retain(|i| seen.insert(i.id.clone()));

        let mut latest: HashMap<&ItemId, ItemFields> = HashMap::new();
        for update in &self.pending_update {
            latest.insert(&update.id, update.fields());
        }
        for create in &mut self.pending_create {
            if let Some(fields) = latest.get(&create.id) {
                create.set_fields(fields.clone());
            }
        }
    }

    fn dedupe_deletes(&mut self) {
        let mut seen = HashSet::with_capacity(self.pending_delete.len());
        self.pending_delete.retain(|id| seen.insert(id.clone()));
    }

    /// Items awaiting remote creation.
    pub fn pending_create(&self) -> &[Item] {
        &self.pending_create
    }

    /// Edits awaiting remote update.
    pub fn pending_update(&self) -> &[Item] {
        &self.pending_update
    }

    /// Identifiers awaiting remote deletion.
    pub fn pending_delete(&self) -> &[ItemId] {
        &self.pending_delete
    }

    /// Total number of queued entries.
    pub fn len(&self) -> usize {
        self.pending_create.len() + self.pending_update.len() + self.pending_delete.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<QueueSnapshot> for MutationQueue {
    fn from(snapshot: QueueSnapshot) -> Self {
        let mut queue = MutationQueue::new();
        queue.restore(snapshot);
        queue
    }
}
