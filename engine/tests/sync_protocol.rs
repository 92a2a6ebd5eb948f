//! Drain protocol tests for swizil-engine
//!
//! End-to-end runs of the engine against an in-memory remote store.

mod common;

use common::{engine_with, fields, has_temporary_ids, run, FakeRemote, NOW};
use proptest::prelude::*;
use swizil_engine::{Effect, Item, ItemFields, ItemId, RemoteCall, SyncEngine};

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn offline_create_then_reconnect() {
    let mut engine = SyncEngine::new();
    let (temp_id, effects) = engine.create(ItemFields::new("x", "y", 1), NOW);
    assert!(effects.is_empty());
    assert_eq!(engine.items().len(), 1);
    assert!(engine.items()[0].id.is_temporary());

    let mut remote = FakeRemote::with_next_id(42);
    let effects = engine.set_connected(true, NOW);
    let reports = run(&mut engine, &mut remote, effects);

    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_success());
    assert_eq!(reports[0].result.resolve(&temp_id), Some(&ItemId::canonical("42")));
    assert_eq!(engine.items()[0].id, ItemId::canonical("42"));
    assert_eq!(engine.items()[0].title, "x");
    assert!(engine.pending().is_empty());
}

#[test]
fn offline_delete_of_canonical_item() {
    let mut engine = engine_with(&[("7", "seven")]);

    engine.delete(ItemId::canonical("7"), NOW);
    assert!(!engine.repository().contains(&ItemId::canonical("7")));

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    assert_eq!(remote.deletes(), [&ItemId::canonical("7")]);
    assert_eq!(remote.calls.len(), 1);
    assert!(!engine.repository().contains(&ItemId::canonical("7")));
}

// ============================================================================
// Laws
// ============================================================================

#[test]
fn draining_empty_queue_is_noop() {
    let mut engine = SyncEngine::new();
    let mut remote = FakeRemote::new();

    assert!(engine.set_connected(true, NOW).is_empty());
    let effects = engine.sync(NOW);
    let reports = run(&mut engine, &mut remote, effects);

    assert!(remote.calls.is_empty());
    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_empty());
    assert_eq!(reports[0].completed_calls, 0);
}

#[test]
fn create_then_delete_never_reaches_remote() {
    let mut engine = SyncEngine::new();
    let (temp_id, _) = engine.create(fields("doomed"), NOW);
    engine.delete(temp_id.clone(), NOW);

    assert!(!engine.repository().contains(&temp_id));
    assert!(engine.queue().is_empty());

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    assert!(remote.calls.is_empty());
}

#[test]
fn update_after_create_folds_into_create() {
    let mut engine = SyncEngine::new();
    let (temp_id, _) = engine.create(fields("draft"), NOW);
    engine.update(Item::new(temp_id.clone(), fields("final")), NOW);

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    assert_eq!(remote.creates(), [&fields("final")]);
    assert_eq!(remote.updates(), 0);
    assert_eq!(engine.items()[0].title, "final");
    assert!(engine.items()[0].id.is_canonical());
}

#[test]
fn calls_follow_create_update_delete_order() {
    let mut engine = engine_with(&[("3", "c"), ("4", "d")]);
    engine.create(fields("a"), NOW);
    engine.create(fields("b"), NOW);
    engine.update(Item::new(ItemId::canonical("3"), fields("c2")), NOW);
    engine.delete(ItemId::canonical("4"), NOW);

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    let expected = vec![
        RemoteCall::Create {
            temp_id: ItemId::Temporary(1),
            fields: fields("a"),
        },
        RemoteCall::Create {
            temp_id: ItemId::Temporary(2),
            fields: fields("b"),
        },
        RemoteCall::Update {
            item: Item::new(ItemId::canonical("3"), fields("c2")),
        },
        RemoteCall::Delete {
            id: ItemId::canonical("4"),
        },
    ];
    assert_eq!(remote.calls, expected);
}

#[test]
fn partial_failure_retries_only_the_remainder() {
    let mut engine = SyncEngine::new();
    let (first, _) = engine.create(fields("first"), NOW);
    let (second, _) = engine.create(fields("second"), NOW);

    let mut remote = FakeRemote::failing_at(1);
    let effects = engine.set_connected(true, NOW);
    let reports = run(&mut engine, &mut remote, effects);

    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_success());
    assert_eq!(reports[0].completed_calls, 1);
    assert!(engine.last_error().is_some());

    // The first item is already canonical; the second still waits.
    let first_id = reports[0].result.resolve(&first).cloned().unwrap();
    assert!(engine.repository().contains(&first_id));
    assert!(engine.repository().contains(&second));
    assert_eq!(engine.queue().pending_create().len(), 1);

    // No automatic retry.
    assert!(!engine.is_syncing());

    let mut retry = FakeRemote::new();
    let effects = engine.sync(NOW);
    let reports = run(&mut engine, &mut retry, effects);

    assert!(reports[0].is_success());
    assert_eq!(retry.creates(), [&fields("second")]);
    assert!(!has_temporary_ids(&engine));
    assert!(engine.last_error().is_none());
}

#[test]
fn failure_during_updates_keeps_deletes_queued() {
    let mut engine = engine_with(&[("1", "a"), ("2", "b")]);
    engine.update(Item::new(ItemId::canonical("1"), fields("a2")), NOW);
    engine.delete(ItemId::canonical("2"), NOW);

    let mut remote = FakeRemote::failing_at(0);
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    assert_eq!(engine.queue().pending_update().len(), 1);
    assert_eq!(engine.queue().pending_delete(), [ItemId::canonical("2")]);
}

#[test]
fn reconnect_while_draining_is_ignored() {
    let mut engine = SyncEngine::new();
    engine.create(fields("a"), NOW);

    let effects = engine.set_connected(true, NOW);
    assert_eq!(effects.len(), 1);

    // Connection flaps while the create is outstanding.
    assert!(engine.set_connected(false, NOW).is_empty());
    assert!(engine.set_connected(true, NOW).is_empty());
    assert!(engine.is_syncing());
}

// ============================================================================
// Mutations while a drain is running
// ============================================================================

#[test]
fn create_while_draining_goes_out_in_follow_up_drain() {
    let mut engine = SyncEngine::new();
    engine.create(fields("a"), NOW);

    let mut remote = FakeRemote::new();
    let mut effects = engine.set_connected(true, NOW);
    let (_, more) = engine.create(fields("b"), NOW);
    assert!(more.is_empty(), "second create waits for the running drain");
    effects.extend(more);

    let reports = run(&mut engine, &mut remote, effects);

    assert_eq!(reports.len(), 2);
    assert_eq!(remote.creates(), [&fields("a"), &fields("b")]);
    assert!(!has_temporary_ids(&engine));
    assert!(engine.pending().is_empty());
}

#[test]
fn delete_of_item_whose_create_is_in_flight() {
    let mut engine = SyncEngine::new();
    let (temp_id, _) = engine.create(fields("a"), NOW);

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    engine.delete(temp_id.clone(), NOW);

    run(&mut engine, &mut remote, effects);

    // The create already left; the follow-up drain deletes it by its new id.
    assert_eq!(remote.creates().len(), 1);
    assert_eq!(remote.deletes(), [&ItemId::canonical("101")]);
    assert!(engine.items().is_empty());
    assert!(engine.pending().is_empty());
    assert!(remote.items.is_empty());
}

#[test]
fn edit_of_item_whose_create_is_in_flight() {
    let mut engine = SyncEngine::new();
    let (temp_id, _) = engine.create(fields("a"), NOW);

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    engine.update(Item::new(temp_id, fields("a2")), NOW);

    run(&mut engine, &mut remote, effects);

    assert_eq!(
        remote.calls.last(),
        Some(&RemoteCall::Update {
            item: Item::new(ItemId::canonical("101"), fields("a2")),
        })
    );
    assert_eq!(engine.items()[0], Item::new(ItemId::canonical("101"), fields("a2")));
}

#[test]
fn edit_during_failed_drain_is_folded_into_retry() {
    let mut engine = SyncEngine::new();
    let (temp_id, _) = engine.create(fields("a"), NOW);

    let mut failing = FakeRemote::failing_at(0);
    let effects = engine.set_connected(true, NOW);
    engine.update(Item::new(temp_id, fields("a2")), NOW);
    run(&mut engine, &mut failing, effects);

    let mut remote = FakeRemote::new();
    let effects = engine.sync(NOW);
    run(&mut engine, &mut remote, effects);

    assert_eq!(remote.creates(), [&fields("a2")]);
    assert_eq!(remote.updates(), 0);
}

#[test]
fn delete_during_failed_update_drops_the_update() {
    let mut engine = engine_with(&[("2", "b")]);
    assert!(engine.set_connected(true, NOW).is_empty());

    let effects = engine.update(Item::new(ItemId::canonical("2"), fields("b2")), NOW);
    assert!(engine.delete(ItemId::canonical("2"), NOW).is_empty());

    let mut failing = FakeRemote::failing_at(0);
    run(&mut engine, &mut failing, effects);

    assert!(engine.queue().pending_update().is_empty());
    assert_eq!(engine.queue().pending_delete(), [ItemId::canonical("2")]);

    let mut remote = FakeRemote::new();
    let effects = engine.sync(NOW);
    run(&mut engine, &mut remote, effects);

    assert_eq!(remote.updates(), 0);
    assert_eq!(remote.deletes(), [&ItemId::canonical("2")]);
    assert!(engine.pending().is_empty());
}

#[test]
fn fetch_after_sync_lists_remote_items() {
    let mut engine = SyncEngine::new();
    engine.create(fields("a"), NOW);

    let mut remote = FakeRemote::new();
    let effects = engine.set_connected(true, NOW);
    run(&mut engine, &mut remote, effects);

    let effects = engine.fetch();
    assert_eq!(effects, vec![Effect::Fetch]);
    run(&mut engine, &mut remote, effects);

    assert_eq!(engine.items(), remote.items.as_slice());
}

#[test]
fn persisted_queue_survives_restart() {
    let mut engine = SyncEngine::new();
    engine.create(fields("a"), NOW);
    engine.create(fields("b"), NOW);

    let json = engine.export_state().to_json().unwrap();
    let snapshot = swizil_engine::EngineSnapshot::from_json(&json).unwrap();
    let mut restored = SyncEngine::from_snapshot(snapshot).unwrap();

    let mut remote = FakeRemote::new();
    let effects = restored.set_connected(true, NOW);
    run(&mut restored, &mut remote, effects);

    assert_eq!(remote.creates().len(), 2);
    assert!(!has_temporary_ids(&restored));
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Action {
    Create(String),
    /// Edit the nth live item
    Update(usize, String),
    /// Delete the nth live item
    Delete(usize),
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Action::Create),
        (0usize..8, "[a-z]{1,8}").prop_map(|(n, t)| Action::Update(n, t)),
        (0usize..8).prop_map(Action::Delete),
    ]
}

fn perform(engine: &mut SyncEngine, action: &Action) -> Vec<Effect> {
    match action {
        Action::Create(title) => engine.create(fields(title), NOW).1,
        Action::Update(n, title) => match engine.items().get(*n) {
            Some(item) => {
                let id = item.id.clone();
                engine.update(Item::new(id, fields(title)), NOW)
            }
            None => Vec::new(),
        },
        Action::Delete(n) => match engine.items().get(*n) {
            Some(item) => {
                let id = item.id.clone();
                engine.delete(id, NOW)
            }
            None => Vec::new(),
        },
    }
}

fn titles(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.title.clone()).collect()
}

proptest! {
    #[test]
    fn prop_offline_creates_all_become_canonical(titles_in in prop::collection::vec("[a-z]{1,8}", 1..20)) {
        let mut engine = SyncEngine::new();
        for title in &titles_in {
            engine.create(fields(title), NOW);
        }

        let mut remote = FakeRemote::new();
        let effects = engine.set_connected(true, NOW);
        run(&mut engine, &mut remote, effects);

        prop_assert!(!has_temporary_ids(&engine));
        prop_assert_eq!(remote.creates().len(), titles_in.len());
        prop_assert!(engine.pending().is_empty());
    }

    #[test]
    fn prop_offline_session_converges_with_remote(actions in prop::collection::vec(arb_action(), 1..30)) {
        let mut engine = SyncEngine::new();
        for action in &actions {
            perform(&mut engine, action);
        }
        let local = titles(engine.items());

        let mut remote = FakeRemote::new();
        let effects = engine.set_connected(true, NOW);
        run(&mut engine, &mut remote, effects);

        prop_assert!(!has_temporary_ids(&engine));
        prop_assert_eq!(titles(engine.items()), local);
        prop_assert_eq!(engine.items(), remote.items.as_slice());
    }

    #[test]
    fn prop_online_session_converges_with_remote(actions in prop::collection::vec(arb_action(), 1..30)) {
        let mut engine = SyncEngine::new();
        let mut remote = FakeRemote::new();
        engine.set_connected(true, NOW);

        // Effects are performed lazily so later actions land mid-drain.
        let mut backlog = Vec::new();
        for action in &actions {
            backlog.extend(perform(&mut engine, action));
        }
        run(&mut engine, &mut remote, backlog);

        prop_assert!(!has_temporary_ids(&engine));
        prop_assert!(engine.pending().is_empty());
        prop_assert_eq!(engine.items(), remote.items.as_slice());
    }

    #[test]
    fn prop_failure_then_retry_never_duplicates(
        titles_in in prop::collection::vec("[a-z]{1,8}", 1..10),
        fail_at in 0usize..10,
    ) {
        let mut engine = SyncEngine::new();
        for title in &titles_in {
            engine.create(fields(title), NOW);
        }

        let mut remote = FakeRemote::failing_at(fail_at);
        let effects = engine.set_connected(true, NOW);
        run(&mut engine, &mut remote, effects);

        let mut retry = FakeRemote::with_next_id(1_000);
        let effects = engine.sync(NOW);
        run(&mut engine, &mut retry, effects);

        let succeeded = remote.items.len();
        prop_assert_eq!(succeeded + retry.items.len(), titles_in.len());
        prop_assert!(!has_temporary_ids(&engine));
        prop_assert_eq!(engine.items().len(), titles_in.len());
    }
}
