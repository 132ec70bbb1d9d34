//! In-memory event store.

use std::collections::HashMap;

use async_trait::async_trait;
use marksync_engine::{
    DeviceId, EventDraft, EventId, EventLog, EventStatus, SyncEvent, SyncState, Timestamp, UserId,
};
use tokio::sync::RwLock;

use super::EventStore;
use crate::error::Result;

/// Event store backed by the engine's [`EventLog`].
///
/// Nothing survives a restart; use [`super::PgEventStore`] for durability.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    log: RwLock<EventLog>,
    states: RwLock<HashMap<(UserId, DeviceId), SyncState>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(EventLog::new()),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    /// Check if no events have been stored.
    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, draft: EventDraft) -> Result<SyncEvent> {
        Ok(self.log.write().await.append(draft))
    }

    async fn events_since(
        &self,
        user_id: &str,
        since: Timestamp,
        exclude_device: Option<&str>,
    ) -> Result<Vec<SyncEvent>> {
        Ok(self
            .log
            .read()
            .await
            .events_since(user_id, since, exclude_device))
    }

    async fn latest_for_resource(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Option<SyncEvent>> {
        Ok(self
            .log
            .read()
            .await
            .latest_for_resource(user_id, resource_id)
            .cloned())
    }

    async fn set_status(&self, ids: &[EventId], status: EventStatus) -> Result<u64> {
        Ok(self.log.write().await.set_status(ids, status) as u64)
    }

    async fn sync_state(&self, user_id: &str, device_id: &str) -> Result<Option<SyncState>> {
        let key = (user_id.to_string(), device_id.to_string());
        Ok(self.states.read().await.get(&key).cloned())
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        let key = (state.user_id.clone(), state.device_id.clone());
        self.states
            .write()
            .await
            .entry(key)
            .and_modify(|stored| stored.advance(state.last_sync_time))
            .or_insert_with(|| state.clone());
        Ok(())
    }
}
