//! Bandwidth optimization for delta batches.
//!
//! A device only needs the latest event per resource to reconstruct current
//! state. The optimizer groups a batch by resource id, keeps the winner of each
//! group under the resolver's last-write-wins rule, and orders the winners by
//! timestamp so cross-resource chronology is preserved.

use crate::resolve::{precedence, resolve_pair};
use crate::{ResourceId, SyncEvent};
use std::collections::HashMap;

/// Collapse a batch of events to one event per resource.
///
/// - Output holds exactly one event per distinct resource id in the input.
/// - Each kept event has the greatest timestamp of its group (ties broken by
///   the larger id), so a later delete is never undone by an older update.
/// - Output is ascending by timestamp, then id.
pub fn optimize_events(events: Vec<SyncEvent>) -> Vec<SyncEvent> {
    if events.len() <= 1 {
        return events;
    }

    let mut latest: HashMap<ResourceId, SyncEvent> = HashMap::with_capacity(events.len());
    for event in events {
        match latest.remove(&event.resource_id) {
            Some(current) => {
                let winner = resolve_pair(current, event);
                latest.insert(winner.resource_id.clone(), winner);
            }
            None => {
                latest.insert(event.resource_id.clone(), event);
            }
        }
    }

    let mut optimized: Vec<SyncEvent> = latest.into_values().collect();
    optimized.sort_by(precedence);
    optimized
}
