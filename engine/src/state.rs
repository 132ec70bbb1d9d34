//! Replication progress and cache summaries.

use crate::{DeviceId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Per-(user, device) replication watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub user_id: UserId,
    pub device_id: DeviceId,
    /// Upper bound of the last acknowledged delta, in milliseconds
    pub last_sync_time: Timestamp,
}

impl SyncState {
    pub fn new(
        user_id: impl Into<UserId>,
        device_id: impl Into<DeviceId>,
        last_sync_time: Timestamp,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            last_sync_time,
        }
    }

    /// Move the watermark forward. A watermark never moves backwards.
    pub fn advance(&mut self, to: Timestamp) {
        self.last_sync_time = self.last_sync_time.max(to);
    }
}

/// Read-mostly summary of a user's offline footprint. Not authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Resource snapshots currently cached
    pub cached_resources: u64,
    /// Offline changes not yet applied
    pub queued_changes: u64,
    /// Last successful sync, in milliseconds
    pub last_sync: Option<Timestamp>,
    /// Approximate size of cached snapshots in bytes
    pub cache_size: u64,
}
