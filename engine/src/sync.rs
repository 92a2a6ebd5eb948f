//! Sync engine - the state container and its transition function.
//!
//! The [`SyncEngine`] owns the item repository, the offline mutation queue,
//! the temporary identity allocator and the drain in progress. It performs no
//! IO: every input ([`Command`], connectivity change, [`Completion`]) returns
//! the [`Effect`]s the host must carry out, and the host feeds each effect's
//! outcome back as a [`Completion`].
//!
//! Every local mutation is applied to the repository immediately and then
//! recorded in the queue. While connected and idle, recording a mutation
//! starts a drain right away; while offline the queue waits for the next
//! false→true connectivity transition or a manual [`Command::Sync`].

use crate::{
    drain::{Drain, DrainReport, RemoteCall, RemoteReply},
    error::Result,
    snapshot::EngineSnapshot,
    DeleteDisposition, Error, Item, ItemFields, ItemId, ItemRepository, MutationQueue,
    QueueSnapshot, RemoteOperation, RemoteOperationError, TempIdAllocator, Timestamp,
};
use serde::{Deserialize, Serialize};

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Reload the item list from the remote store
    Fetch,
    Create { fields: ItemFields },
    Update { item: Item },
    Delete { id: ItemId },
    /// Drain the queue now
    Sync,
}

/// A side effect the host must perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Effect {
    /// Issue a call against the remote item store, then report its completion.
    Remote { call: RemoteCall },
    /// Fetch the full item list, then report [`Completion::Fetched`].
    Fetch,
    /// A drain has finished; informational.
    DrainFinished { report: DrainReport },
}

/// The settled outcome of an [`Effect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Completion {
    Created { item: Item },
    Updated { item: Item },
    Deleted,
    Fetched { items: Vec<Item> },
    Failed { error: RemoteOperationError },
}

impl From<RemoteReply> for Completion {
    fn from(reply: RemoteReply) -> Self {
        match reply {
            RemoteReply::Created(item) => Completion::Created { item },
            RemoteReply::Updated(item) => Completion::Updated { item },
            RemoteReply::Deleted => Completion::Deleted,
        }
    }
}

impl From<RemoteOperationError> for Completion {
    fn from(error: RemoteOperationError) -> Self {
        Completion::Failed { error }
    }
}

/// State of the last item list fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// What the UI needs to render sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub connected: bool,
    pub syncing: bool,
    pub pending_create: usize,
    pub pending_update: usize,
    pub pending_delete: usize,
    /// Total queued entries, including those of the drain in progress
    pub pending_changes: usize,
    pub fetch_status: FetchStatus,
    pub last_fetched: Option<Timestamp>,
    pub last_synced: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RemoteOperationError>,
}

/// The client-side sync state container.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    repository: ItemRepository,
    /// Entries queued since the current drain (if any) started
    queue: MutationQueue,
    allocator: TempIdAllocator,
    connected: bool,
    drain: Option<Drain>,
    fetch_status: FetchStatus,
    last_fetched: Option<Timestamp>,
    last_synced: Option<Timestamp>,
    last_error: Option<RemoteOperationError>,
}

impl SyncEngine {
    /// Create an empty, offline engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an offline engine from a persisted snapshot.
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Result<Self> {
        let mut engine = Self::new();
        engine.import_state(snapshot)?;
        Ok(engine)
    }

    /// Items in display order.
    pub fn items(&self) -> &[Item] {
        self.repository.list()
    }

    /// The item repository.
    pub fn repository(&self) -> &ItemRepository {
        &self.repository
    }

    /// Entries queued since the current drain started (all entries when idle).
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Everything not yet confirmed by the remote store: the unconfirmed part
    /// of the drain in progress followed by the live queue.
    pub fn pending(&self) -> MutationQueue {
        let mut pending = self.queue.clone();
        if let Some(drain) = &self.drain {
            pending.restore(drain.remainder());
        }
        pending
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Check if a drain is in progress.
    pub fn is_syncing(&self) -> bool {
        self.drain.is_some()
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.fetch_status
    }

    /// The most recent remote failure, cleared by the next successful drain.
    pub fn last_error(&self) -> Option<&RemoteOperationError> {
        self.last_error.as_ref()
    }

    /// Current sync state for display.
    pub fn status(&self) -> SyncStatus {
        let pending = self.pending();
        SyncStatus {
            connected: self.connected,
            syncing: self.is_syncing(),
            pending_create: pending.pending_create().len(),
            pending_update: pending.pending_update().len(),
            pending_delete: pending.pending_delete().len(),
            pending_changes: pending.len(),
            fetch_status: self.fetch_status,
            last_fetched: self.last_fetched,
            last_synced: self.last_synced,
            last_error: self.last_error.clone(),
        }
    }

    /// Process a user action.
    pub fn dispatch(&mut self, command: Command, now: Timestamp) -> Vec<Effect> {
        match command {
            Command::Fetch => self.fetch(),
            Command::Create { fields } => self.create(fields, now).1,
            Command::Update { item } => self.update(item, now),
            Command::Delete { id } => self.delete(id, now),
            Command::Sync => self.sync(now),
        }
    }

    /// Create an item locally under a fresh temporary identifier.
    pub fn create(&mut self, fields: ItemFields, now: Timestamp) -> (ItemId, Vec<Effect>) {
        let id = self.allocator.allocate();
        let item = Item::new(id.clone(), fields);

        self.repository.insert_local(item.clone());
        self.queue.enqueue_create(item);
        tracing::debug!(id = %id, "item created locally");

        (id, self.maybe_drain(now))
    }

    /// Apply an edit locally and queue it.
    pub fn update(&mut self, item: Item, now: Timestamp) -> Vec<Effect> {
        if let Err(err) = self.repository.apply_local(item.clone()) {
            tracing::warn!(error = %err, "ignoring update");
            return Vec::new();
        }

        tracing::debug!(id = %item.id, "item updated locally");
        self.queue.enqueue_update(item);
        self.maybe_drain(now)
    }

    /// Remove an item locally and queue its deletion.
    pub fn delete(&mut self, id: ItemId, now: Timestamp) -> Vec<Effect> {
        if let Err(err) = self.repository.remove_local(&id) {
            tracing::warn!(error = %err, "ignoring delete");
            return Vec::new();
        }

        match self.queue.enqueue_delete(id.clone()) {
            DeleteDisposition::Cancelled => {
                tracing::debug!(id = %id, "delete cancelled a queued create");
            }
            DeleteDisposition::Queued | DeleteDisposition::AlreadyQueued => {
                tracing::debug!(id = %id, "item deleted locally");
            }
        }
        self.maybe_drain(now)
    }

    /// Request the item list from the remote store.
    pub fn fetch(&mut self) -> Vec<Effect> {
        if !self.connected {
            tracing::debug!("offline, fetch skipped");
            return Vec::new();
        }
        if self.fetch_status == FetchStatus::Loading {
            return Vec::new();
        }

        self.fetch_status = FetchStatus::Loading;
        vec![Effect::Fetch]
    }

    /// Drain the queue now.
    ///
    /// Ignored while offline or while a drain is running. With nothing queued
    /// the drain finishes immediately without any remote call.
    pub fn sync(&mut self, now: Timestamp) -> Vec<Effect> {
        if !self.connected {
            tracing::debug!("offline, sync deferred");
            return Vec::new();
        }
        if self.drain.is_some() {
            tracing::trace!(reason = %Error::ReentrantDrain, "sync request ignored");
            return Vec::new();
        }
        if self.queue.is_empty() {
            return vec![Effect::DrainFinished {
                report: DrainReport::default(),
            }];
        }
        self.begin_drain(now)
    }

    /// Feed a connectivity signal. Only a false→true transition starts a drain.
    pub fn set_connected(&mut self, connected: bool, now: Timestamp) -> Vec<Effect> {
        if self.connected == connected {
            return Vec::new();
        }

        self.connected = connected;
        tracing::info!(connected, "connectivity changed");

        if connected {
            self.maybe_drain(now)
        } else {
            Vec::new()
        }
    }

    /// Report the outcome of an effect.
    pub fn settle(&mut self, completion: Completion, now: Timestamp) -> Result<Vec<Effect>> {
        match completion {
            Completion::Fetched { items } => {
                self.apply_fetch(items, now);
                Ok(Vec::new())
            }
            Completion::Failed { error } if error.operation == RemoteOperation::Fetch => {
                tracing::warn!(error = %error, "fetch failed");
                self.fetch_status = FetchStatus::Failed;
                self.last_error = Some(error);
                Ok(Vec::new())
            }
            Completion::Failed { error } => {
                if self.drain.is_none() {
                    return Err(Error::UnexpectedCompletion(format!(
                        "no drain in progress for failure: {error}"
                    )));
                }
                Ok(self.finish_drain(Some(error), now))
            }
            Completion::Created { item } => self.advance_drain(RemoteReply::Created(item), now),
            Completion::Updated { item } => self.advance_drain(RemoteReply::Updated(item), now),
            Completion::Deleted => self.advance_drain(RemoteReply::Deleted, now),
        }
    }

    fn maybe_drain(&mut self, now: Timestamp) -> Vec<Effect> {
        if self.connected && self.drain.is_none() && !self.queue.is_empty() {
            self.begin_drain(now)
        } else {
            Vec::new()
        }
    }

    fn begin_drain(&mut self, now: Timestamp) -> Vec<Effect> {
        let snapshot = self.queue.drain_snapshot();
        self.queue.clear();

        tracing::info!(
            creates = snapshot.pending_create.len(),
            updates = snapshot.pending_update.len(),
            deletes = snapshot.pending_delete.len(),
            "drain started"
        );

        self.drain = Some(Drain::new(snapshot));
        self.step_drain(now)
    }

    fn step_drain(&mut self, now: Timestamp) -> Vec<Effect> {
        let Some(drain) = self.drain.as_mut() else {
            return Vec::new();
        };

        match drain.next_call() {
            Some(call) => {
                tracing::debug!(operation = %call.operation(), "issuing remote call");
                vec![Effect::Remote { call }]
            }
            None => self.finish_drain(None, now),
        }
    }

    fn advance_drain(&mut self, reply: RemoteReply, now: Timestamp) -> Result<Vec<Effect>> {
        let drain = self
            .drain
            .as_mut()
            .ok_or_else(|| Error::UnexpectedCompletion("no drain in progress".into()))?;

        if let Some(rekey) = drain.record_success(reply)? {
            if let Err(err) = self.repository.rekey(&rekey.temporary, &rekey.canonical) {
                // The user deleted the item while its create was in flight;
                // the queued delete is rewritten below.
                tracing::warn!(error = %err, "rekey target already removed");
            }
            self.queue.rekey(&rekey.temporary, &rekey.canonical);
            tracing::debug!(
                temporary = %rekey.temporary,
                canonical = %rekey.canonical,
                "temporary id resolved"
            );
        }

        Ok(self.step_drain(now))
    }

    fn finish_drain(&mut self, error: Option<RemoteOperationError>, now: Timestamp) -> Vec<Effect> {
        let Some(drain) = self.drain.take() else {
            return Vec::new();
        };

        let succeeded = error.is_none();
        match &error {
            Some(err) => {
                let remainder = drain.remainder();
                tracing::warn!(error = %err, requeued = remainder.len(), "drain failed");
                self.queue.restore(remainder);
                self.last_error = Some(err.clone());
            }
            None => {
                tracing::info!(resolved = drain.result().len(), "drain finished");
                self.last_error = None;
                self.last_synced = Some(now);
            }
        }

        let mut effects = vec![Effect::DrainFinished {
            report: drain.into_report(error),
        }];
        if succeeded {
            // Mutations queued mid-drain go out in a follow-up drain.
            effects.extend(self.maybe_drain(now));
        }
        effects
    }

    /// Replace the repository with a fetched list, then re-apply everything
    /// still pending so unsynced local edits stay visible.
    fn apply_fetch(&mut self, items: Vec<Item>, now: Timestamp) {
        let pending = self.pending();
        tracing::info!(count = items.len(), pending = pending.len(), "items fetched");

        self.repository.replace_all(items);
        for item in pending.pending_create() {
            if !self.repository.contains(&item.id) {
                self.repository.insert_local(item.clone());
            }
        }
        for item in pending.pending_update() {
            // Updates for items the remote no longer lists are dropped from view.
            let _ = self.repository.apply_local(item.clone());
        }
        for id in pending.pending_delete() {
            let _ = self.repository.remove_local(id);
        }

        self.fetch_status = FetchStatus::Succeeded;
        self.last_fetched = Some(now);
    }

    /// Export items and pending mutations for persistence.
    ///
    /// Entries of a drain in progress are included, so a restart re-sends
    /// anything the remote store has not confirmed.
    pub fn export_state(&self) -> EngineSnapshot {
        let pending = self.pending();
        EngineSnapshot {
            items: self.repository.list().to_vec(),
            pending_create: pending.pending_create().to_vec(),
            pending_update: pending.pending_update().to_vec(),
            pending_delete: pending.pending_delete().to_vec(),
            next_temp_id: self.allocator.next_value(),
            last_fetched: self.last_fetched,
            ..EngineSnapshot::new()
        }
    }

    /// Replace items and pending mutations with a snapshot's.
    ///
    /// Connectivity is kept; fetch status and last error are reset.
    pub fn import_state(&mut self, snapshot: EngineSnapshot) -> Result<()> {
        if self.drain.is_some() {
            return Err(Error::InvalidSnapshot(
                "cannot import while a drain is in progress".into(),
            ));
        }
        snapshot.validate()?;

        let mut allocator = TempIdAllocator::starting_at(snapshot.next_temp_id);
        for item in snapshot
            .items
            .iter()
            .chain(&snapshot.pending_create)
            .chain(&snapshot.pending_update)
        {
            allocator.observe(&item.id);
        }
        for id in &snapshot.pending_delete {
            allocator.observe(id);
        }

        self.allocator = allocator;
        self.repository.replace_all(snapshot.items);
        self.queue = MutationQueue::from(QueueSnapshot {
            pending_create: snapshot.pending_create,
            pending_update: snapshot.pending_update,
            pending_delete: snapshot.pending_delete,
        });
        self.last_fetched = snapshot.last_fetched;
        self.fetch_status = FetchStatus::Idle;
        self.last_error = None;

        Ok(())
    }
}
