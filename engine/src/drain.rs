//! Drain - one reconciliation pass over a queue snapshot.
//!
//! A [`Drain`] is a pure state machine. It hands out one [`RemoteCall`] at a
//! time and advances when told the call succeeded. It never performs IO.
//!
//! # Algorithm
//!
//! 1. Creates, in enqueue order. Each success yields a [`Rekey`].
//! 2. Updates, in enqueue order, skipping items created by this drain (their
//!    create already carried the latest fields).
//! 3. Deletes, in enqueue order.
//!
//! On failure the caller takes [`Drain::remainder`]: every entry not yet
//! confirmed by the remote store, with resolved identifiers rewritten.

use crate::{
    error::Result, Error, Item, ItemFields, ItemId, QueueSnapshot, RemoteOperation,
    RemoteOperationError,
};
use serde::{Deserialize, Serialize};

/// A call to issue against the remote item store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RemoteCall {
    /// Create an item; `temp_id` is local bookkeeping and is not sent.
    Create { temp_id: ItemId, fields: ItemFields },
    Update { item: Item },
    Delete { id: ItemId },
}

impl RemoteCall {
    /// Describe the call for error reporting.
    pub fn operation(&self) -> RemoteOperation {
        match self {
            RemoteCall::Create { temp_id, .. } => RemoteOperation::Create {
                temp_id: temp_id.clone(),
            },
            RemoteCall::Update { item } => RemoteOperation::Update {
                id: item.id.clone(),
            },
            RemoteCall::Delete { id } => RemoteOperation::Delete { id: id.clone() },
        }
    }

    /// Build the error for this call failing with `cause`.
    pub fn failed(&self, cause: impl Into<String>) -> RemoteOperationError {
        RemoteOperationError::new(self.operation(), cause)
    }
}

/// Successful reply to a [`RemoteCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RemoteReply {
    /// The canonical item the store created
    Created(Item),
    Updated(Item),
    Deleted,
}

/// A temporary identifier resolved to a canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rekey {
    pub temporary: ItemId,
    pub canonical: ItemId,
}

/// Mapping from temporary to canonical identifiers produced by one drain,
/// in the order the creates resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncResult {
    rekeys: Vec<Rekey>,
}

impl SyncResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical identifier for a temporary one, if this drain resolved it.
    pub fn resolve(&self, temporary: &ItemId) -> Option<&ItemId> {
        self.rekeys
            .iter()
            .find(|r| &r.temporary == temporary)
            .map(|r| &r.canonical)
    }

    /// Temporary identifier this drain resolved to `canonical`, if any.
    pub fn temporary_for(&self, canonical: &ItemId) -> Option<&ItemId> {
        self.rekeys
            .iter()
            .find(|r| &r.canonical == canonical)
            .map(|r| &r.temporary)
    }

    /// Rewrite `id` if this drain resolved it, otherwise return it unchanged.
    pub fn map(&self, id: &ItemId) -> ItemId {
        self.resolve(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// All resolutions in order.
    pub fn rekeys(&self) -> &[Rekey] {
        &self.rekeys
    }

    pub fn len(&self) -> usize {
        self.rekeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rekeys.is_empty()
    }

    fn push(&mut self, rekey: Rekey) {
        self.rekeys.push(rekey);
    }
}

/// Outcome of a finished drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Identifiers resolved by this drain (also on partial failure)
    pub result: SyncResult,
    /// Number of remote calls that succeeded
    pub completed_calls: usize,
    /// The failure that stopped the drain, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteOperationError>,
}

impl DrainReport {
    /// Check if the drain reconciled every entry of its snapshot.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Create,
    Update,
    Delete,
    Done,
}

/// In-progress reconciliation of one queue snapshot.
#[derive(Debug, Clone)]
pub struct Drain {
    snapshot: QueueSnapshot,
    phase: Phase,
    /// Index of the next unconfirmed entry in the current phase's list
    cursor: usize,
    awaiting: Option<RemoteCall>,
    result: SyncResult,
    completed_calls: usize,
}

impl Drain {
    /// Start a drain over `snapshot`.
    pub fn new(snapshot: QueueSnapshot) -> Self {
        Self {
            snapshot,
            phase: Phase::Create,
            cursor: 0,
            awaiting: None,
            result: SyncResult::new(),
            completed_calls: 0,
        }
    }

    /// The snapshot this drain reconciles.
    pub fn snapshot(&self) -> &QueueSnapshot {
        &self.snapshot
    }

    /// Resolutions made so far.
    pub fn result(&self) -> &SyncResult {
        &self.result
    }

    /// The call currently outstanding, if any.
    pub fn awaiting(&self) -> Option<&RemoteCall> {
        self.awaiting.as_ref()
    }

    /// Check if every entry has been reconciled.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The next call to issue, or `None` once the drain is complete.
    ///
    /// While a call is outstanding the same call is returned again.
    pub fn next_call(&mut self) -> Option<RemoteCall> {
        if let Some(call) = &self.awaiting {
            return Some(call.clone());
        }

        loop {
            match self.phase {
                Phase::Create => match self.snapshot.pending_create.get(self.cursor) {
                    Some(item) => {
                        let call = RemoteCall::Create {
                            temp_id: item.id.clone(),
                            fields: item.fields(),
                        };
                        self.awaiting = Some(call.clone());
                        return Some(call);
                    }
                    None => self.enter(Phase::Update),
                },
                Phase::Update => match self.snapshot.pending_update.get(self.cursor) {
                    Some(item) if self.result.resolve(&item.id).is_some() => {
                        tracing::debug!(id = %item.id, "skipping update of item created in this drain");
                        self.cursor += 1;
                    }
                    Some(item) if item.id.is_temporary() => {
                        tracing::warn!(id = %item.id, "skipping update of unresolved temporary id");
                        self.cursor += 1;
                    }
                    Some(item) => {
                        let call = RemoteCall::Update { item: item.clone() };
                        self.awaiting = Some(call.clone());
                        return Some(call);
                    }
                    None => self.enter(Phase::Delete),
                },
                Phase::Delete => match self.snapshot.pending_delete.get(self.cursor) {
                    Some(id) => {
                        let id = self.result.map(id);
                        if id.is_temporary() {
                            tracing::warn!(id = %id, "skipping delete of unresolved temporary id");
                            self.cursor += 1;
                            continue;
                        }
                        let call = RemoteCall::Delete { id };
                        self.awaiting = Some(call.clone());
                        return Some(call);
                    }
                    None => self.enter(Phase::Done),
                },
                Phase::Done => return None,
            }
        }
    }

    /// Record that the outstanding call succeeded.
    ///
    /// Returns the resolution when the call was a create.
    pub fn record_success(&mut self, reply: RemoteReply) -> Result<Option<Rekey>> {
        let call = self
            .awaiting
            .take()
            .ok_or_else(|| Error::UnexpectedCompletion("no remote call outstanding".into()))?;

        let rekey = match (call.clone(), reply) {
            (RemoteCall::Create { temp_id, .. }, RemoteReply::Created(item)) => {
                if item.id.is_temporary() {
                    let message = format!("remote store returned temporary id {}", item.id);
                    self.awaiting = Some(call);
                    return Err(Error::UnexpectedCompletion(message));
                }
                if let Some(earlier) = self.result.temporary_for(&item.id) {
                    let message = format!(
                        "remote store returned id {} for both {earlier} and {temp_id}",
                        item.id
                    );
                    self.awaiting = Some(call);
                    return Err(Error::UnexpectedCompletion(message));
                }
                let rekey = Rekey {
                    temporary: temp_id,
                    canonical: item.id,
                };
                self.result.push(rekey.clone());
                Some(rekey)
            }
            (RemoteCall::Update { .. }, RemoteReply::Updated(_)) => None,
            (RemoteCall::Delete { .. }, RemoteReply::Deleted) => None,
            (_, reply) => {
                let message = format!("{reply:?} does not answer {}", call.operation());
                self.awaiting = Some(call);
                return Err(Error::UnexpectedCompletion(message));
            }
        };

        self.cursor += 1;
        self.completed_calls += 1;
        Ok(rekey)
    }

    /// Entries not yet confirmed by the remote store, including the
    /// outstanding call, with identifiers resolved by this drain rewritten.
    pub fn remainder(&self) -> QueueSnapshot {
        let unresolved_update = |item: &Item| self.result.resolve(&item.id).is_none();

        let snapshot = &self.snapshot;
        let (creates, updates, deletes): (&[Item], &[Item], &[ItemId]) = match self.phase {
            Phase::Create => (
                &snapshot.pending_create[self.cursor..],
                &snapshot.pending_update[..],
                &snapshot.pending_delete[..],
            ),
            Phase::Update => (
                &[],
                &snapshot.pending_update[self.cursor..],
                &snapshot.pending_delete[..],
            ),
            Phase::Delete => (&[], &[], &snapshot.pending_delete[self.cursor..]),
            Phase::Done => (&[], &[], &[]),
        };

        QueueSnapshot {
            pending_create: creates.to_vec(),
            pending_update: updates
                .iter()
                .filter(|item| unresolved_update(item))
                .cloned()
                .collect(),
            pending_delete: deletes.iter().map(|id| self.result.map(id)).collect(),
        }
    }

    /// Finish the drain and build its report.
    pub fn into_report(self, error: Option<RemoteOperationError>) -> DrainReport {
        DrainReport {
            result: self.result,
            completed_calls: self.completed_calls,
            error,
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.cursor = 0;
    }
}
