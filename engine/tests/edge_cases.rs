//! Edge case tests for marksync-engine
//!
//! These tests cover clock skew, ties, resurrection and scoping across the
//! log, the resolver and the optimizer together.

use marksync_engine::{
    arbitrate, optimize_events, resolve_conflict, resolve_since, Authority, ChangeType, Error,
    EventAction, EventLog, EventStatus, NewEvent, NewOfflineChange, DEFAULT_LOOKBACK_MS,
};
use serde_json::json;

fn new_event(user: &str, resource: &str, action: &str, device: &str, ts: u64) -> NewEvent {
    NewEvent {
        category: format!("bookmark_{}", action),
        user_id: user.into(),
        resource_id: resource.into(),
        action: action.into(),
        payload: json!({"title": format!("{}@{}", resource, ts)}),
        device_id: device.into(),
        timestamp: ts,
    }
}

fn append(log: &mut EventLog, user: &str, resource: &str, action: &str, device: &str, ts: u64) {
    log.append(new_event(user, resource, action, device, ts).validate().unwrap());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn invalid_action_never_reaches_log() {
    let log = EventLog::new();
    let result = new_event("u", "b-1", "rename", "d", 1).validate();

    assert_eq!(result.unwrap_err(), Error::InvalidAction("rename".into()));
    assert!(log.is_empty());
}

#[test]
fn empty_action_is_invalid() {
    assert!(new_event("u", "b-1", "", "d", 1).validate().is_err());
}

// ============================================================================
// Clock skew
// ============================================================================

#[test]
fn skewed_device_loses_despite_later_append() {
    let mut log = EventLog::new();
    append(&mut log, "u", "b-1", "update", "fast-clock", 10_000);
    append(&mut log, "u", "b-1", "update", "slow-clock", 5_000);

    let delta = optimize_events(log.events_since("u", 0, None));
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].device_id, "fast-clock");
}

#[test]
fn per_device_order_survives_coalescing() {
    let mut log = EventLog::new();
    append(&mut log, "u", "a", "create", "phone", 1);
    append(&mut log, "u", "b", "create", "laptop", 2);
    append(&mut log, "u", "a", "update", "phone", 3);
    append(&mut log, "u", "c", "create", "laptop", 4);

    let delta = optimize_events(log.events_since("u", 0, None));
    let order: Vec<_> = delta.iter().map(|e| e.resource_id.as_str()).collect();
    assert_eq!(order, vec!["b", "a", "c"]);
}

// ============================================================================
// Delete semantics
// ============================================================================

#[test]
fn delete_then_recreate_resurrects() {
    let mut log = EventLog::new();
    append(&mut log, "u", "b-1", "create", "d", 1);
    append(&mut log, "u", "b-1", "delete", "d", 2);
    append(&mut log, "u", "b-1", "create", "d", 3);

    let delta = optimize_events(log.events_since("u", 0, None));
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].action, EventAction::Create);
}

#[test]
fn delete_is_kept_as_event() {
    let mut log = EventLog::new();
    append(&mut log, "u", "b-1", "create", "d", 1);
    append(&mut log, "u", "b-1", "delete", "d", 2);

    // The log still holds both facts.
    assert_eq!(log.len(), 2);
    let latest = log.latest_for_resource("u", "b-1").unwrap();
    assert!(latest.is_delete());
}

// ============================================================================
// Ties
// ============================================================================

#[test]
fn identical_timestamps_resolve_to_last_appended() {
    let mut log = EventLog::new();
    for device in ["a", "b", "c"] {
        append(&mut log, "u", "b-1", "update", device, 777);
    }

    let events = log.events_since("u", 0, None);
    let winner = resolve_conflict(events.iter()).unwrap();
    assert_eq!(winner.device_id, "c");

    let delta = optimize_events(events);
    assert_eq!(delta[0].device_id, "c");
}

// ============================================================================
// Scoping and watermarks
// ============================================================================

#[test]
fn users_do_not_see_each_other() {
    let mut log = EventLog::new();
    append(&mut log, "alice", "shared-id", "create", "d", 1);
    append(&mut log, "bob", "shared-id", "delete", "d", 2);

    let alice = optimize_events(log.events_since("alice", 0, None));
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].action, EventAction::Create);
}

#[test]
fn watermark_boundary_is_exclusive() {
    let mut log = EventLog::new();
    append(&mut log, "u", "a", "create", "d", 5_000);
    append(&mut log, "u", "b", "create", "d", 5_001);

    let since = resolve_since(Some(5), 1_000_000, DEFAULT_LOOKBACK_MS);
    let delta = log.events_since("u", since, None);
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].resource_id, "b");
}

#[test]
fn status_changes_do_not_affect_delta() {
    let mut log = EventLog::new();
    append(&mut log, "u", "a", "create", "d", 10);
    log.set_status(&[1], EventStatus::Synced);

    let delta = log.events_since("u", 0, None);
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].status, EventStatus::Synced);
}

// ============================================================================
// Offline changes against the log
// ============================================================================

#[test]
fn queued_update_loses_to_later_server_event() {
    let mut log = EventLog::new();
    let change = NewOfflineChange {
        user_id: "u".into(),
        device_id: "device-a".into(),
        change_type: "bookmark_update".into(),
        resource_id: "bookmark-1".into(),
        payload: json!({"title": "Local"}),
        timestamp: 1_000,
    }
    .validate("chg-1")
    .unwrap();
    assert_eq!(change.change_type, ChangeType::BookmarkUpdate);

    let mut server = new_event("u", "bookmark-1", "create", "device-b", 2_000);
    server.payload = json!({"title": "Server"});
    let server = log.append(server.validate().unwrap());

    let latest = log.latest_for_resource("u", "bookmark-1").unwrap();
    assert_eq!(latest.id, server.id);
    assert_eq!(arbitrate(&change, latest), Authority::Server);
}

#[test]
fn large_batch_coalesces() {
    let mut log = EventLog::new();
    for i in 0..10_000u64 {
        append(&mut log, "u", &format!("r{}", i % 100), "update", "d", i);
    }

    let delta = optimize_events(log.events_since("u", 0, None));
    assert_eq!(delta.len(), 100);
    assert!(delta.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(delta.last().unwrap().timestamp, 9_999);
}
