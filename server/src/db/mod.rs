//! Event store persistence.
//!
//! The event store is the durable, append-only record of sync events plus the
//! per-(user, device) watermark table. Two backends are provided: PostgreSQL
//! for deployments and an in-memory log for tests and single-node development.

mod memory;
mod pool;
mod postgres;

pub use memory::MemoryEventStore;
pub use pool::*;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use marksync_engine::{EventDraft, EventId, EventStatus, SyncEvent, SyncState, Timestamp};

use crate::error::Result;

/// Durable, append-only store of sync events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a validated event. The store assigns its id and `pending` status.
    async fn append(&self, draft: EventDraft) -> Result<SyncEvent>;

    /// Events of `user_id` with `timestamp > since`, optionally without the
    /// events produced by `exclude_device`.
    async fn events_since(
        &self,
        user_id: &str,
        since: Timestamp,
        exclude_device: Option<&str>,
    ) -> Result<Vec<SyncEvent>>;

    /// The authoritative (latest) event for a resource.
    async fn latest_for_resource(&self, user_id: &str, resource_id: &str)
        -> Result<Option<SyncEvent>>;

    /// Update delivery status. Returns the number of events changed.
    async fn set_status(&self, ids: &[EventId], status: EventStatus) -> Result<u64>;

    /// Stored watermark for a device.
    async fn sync_state(&self, user_id: &str, device_id: &str) -> Result<Option<SyncState>>;

    /// Insert or replace the watermark for a device.
    async fn save_sync_state(&self, state: &SyncState) -> Result<()>;
}
