//! In-memory remote store and effect loop shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use swizil_engine::{
    Completion, DrainReport, Effect, EngineSnapshot, Item, ItemFields, ItemId, RemoteCall,
    SyncEngine,
};

pub const NOW: u64 = 1_706_745_600_000;

/// Records every call and answers like a well-behaved REST backend.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub calls: Vec<RemoteCall>,
    pub items: Vec<Item>,
    next_id: u64,
    fail_on: Option<usize>,
}

impl FakeRemote {
    /// Canonical ids start at 101.
    pub fn new() -> Self {
        Self::with_next_id(101)
    }

    pub fn with_next_id(next_id: u64) -> Self {
        Self {
            next_id,
            ..Self::default()
        }
    }

    /// Fail the call with this zero-based index.
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_on: Some(index),
            ..Self::new()
        }
    }

    pub fn respond(&mut self, call: &RemoteCall) -> Completion {
        let index = self.calls.len();
        self.calls.push(call.clone());

        if self.fail_on == Some(index) {
            return call.failed("connection reset").into();
        }

        match call {
            RemoteCall::Create { fields, .. } => {
                let item = Item::new(ItemId::canonical(self.next_id.to_string()), fields.clone());
                self.next_id += 1;
                self.items.push(item.clone());
                Completion::Created { item }
            }
            RemoteCall::Update { item } => {
                if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
                    *existing = item.clone();
                }
                Completion::Updated { item: item.clone() }
            }
            RemoteCall::Delete { id } => {
                self.items.retain(|i| &i.id != id);
                Completion::Deleted
            }
        }
    }

    pub fn creates(&self) -> Vec<&ItemFields> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Create { fields, .. } => Some(fields),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::Update { .. }))
            .count()
    }

    pub fn deletes(&self) -> Vec<&ItemId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::Delete { id } => Some(id),
                _ => None,
            })
            .collect()
    }
}

/// Perform effects until the engine goes quiet, returning every drain report.
pub fn run(engine: &mut SyncEngine, remote: &mut FakeRemote, effects: Vec<Effect>) -> Vec<DrainReport> {
    let mut pending: VecDeque<Effect> = effects.into();
    let mut reports = Vec::new();

    while let Some(effect) = pending.pop_front() {
        match effect {
            Effect::Remote { call } => {
                let completion = remote.respond(&call);
                pending.extend(engine.settle(completion, NOW).unwrap());
            }
            Effect::Fetch => {
                let items = remote.items.clone();
                pending.extend(engine.settle(Completion::Fetched { items }, NOW).unwrap());
            }
            Effect::DrainFinished { report } => reports.push(report),
        }
    }

    reports
}

pub fn fields(title: &str) -> ItemFields {
    ItemFields::new(title, "body", 1)
}

/// An offline engine already holding these canonical items.
pub fn engine_with(items: &[(&str, &str)]) -> SyncEngine {
    let snapshot = EngineSnapshot {
        items: items
            .iter()
            .map(|(id, title)| Item::new(ItemId::canonical(*id), fields(title)))
            .collect(),
        ..EngineSnapshot::new()
    };
    SyncEngine::from_snapshot(snapshot).unwrap()
}

pub fn has_temporary_ids(engine: &SyncEngine) -> bool {
    engine.items().iter().any(|i| i.id.is_temporary())
}
