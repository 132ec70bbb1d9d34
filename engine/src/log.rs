//! EventLog - the in-memory, append-only event container.
//!
//! Events are stored in append order and never removed. Ids are assigned on
//! append from a strictly increasing sequence, so a larger id always means a
//! later append regardless of device clocks.

use crate::{EventDraft, EventId, EventStatus, SyncEvent, Timestamp};
use std::collections::HashMap;

/// Append-only log of sync events for any number of users.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    /// Events in append order
    events: Vec<SyncEvent>,
    /// Position of each event in `events`, by id
    index: HashMap<EventId, usize>,
    /// Next id to assign
    next_id: EventId,
}

impl EventLog {
    /// Create an empty log. The first appended event gets id 1.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    /// Append a validated draft and return the stored event.
    pub fn append(&mut self, draft: EventDraft) -> SyncEvent {
        let id = self.next_id.max(1);
        self.next_id = id + 1;

        let event = SyncEvent::from_draft(id, draft);
        self.index.insert(id, self.events.len());
        self.events.push(event.clone());
        event
    }

    /// Get an event by id.
    pub fn get(&self, id: EventId) -> Option<&SyncEvent> {
        self.index.get(&id).map(|&pos| &self.events[pos])
    }

    /// All events of `user_id` with `timestamp > since`, in append order.
    ///
    /// When `exclude_device` is set, events produced by that device are left
    /// out.
    pub fn events_since(
        &self,
        user_id: &str,
        since: Timestamp,
        exclude_device: Option<&str>,
    ) -> Vec<SyncEvent> {
        self.events
            .iter()
            .filter(|e| e.user_id == user_id && e.timestamp > since)
            .filter(|e| exclude_device != Some(e.device_id.as_str()))
            .cloned()
            .collect()
    }

    /// The authoritative event for a resource, if any.
    pub fn latest_for_resource(&self, user_id: &str, resource_id: &str) -> Option<&SyncEvent> {
        self.events
            .iter()
            .filter(|e| e.user_id == user_id && e.resource_id == resource_id)
            .reduce(crate::resolve_pair)
    }

    /// Set the status of the given events. Status is the only mutable field.
    ///
    /// Returns the number of events that changed.
    pub fn set_status(&mut self, ids: &[EventId], status: EventStatus) -> usize {
        let mut changed = 0;
        for id in ids {
            if let Some(&pos) = self.index.get(id) {
                let event = &mut self.events[pos];
                if event.status != status {
                    event.status = status;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over all events in append order.
    pub fn iter(&self) -> impl Iterator<Item = &SyncEvent> {
        self.events.iter()
    }
}
