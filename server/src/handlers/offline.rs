//! Offline change queue.
//!
//! Changes reported by a device that was disconnected are staged in the cache
//! under `offline:queue:{user}:{change}` and listed through a per-user ordered
//! index of change ids. Replay walks the unapplied changes in timestamp order
//! and hands each one to the delta engine; one failing change never aborts the
//! batch.

use std::sync::Arc;
use std::time::Duration;

use marksync_engine::{
    validate_change_type, CacheStats, ChangeId, NewOfflineChange, OfflineChange, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::delta::{DeltaSync, ReplayOutcome};
use crate::cache::{keys, Cache};
use crate::error::{AppError, Result};
use crate::locks::KeyedLocks;
use crate::now_millis;

/// Tunables of the offline queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    /// How long a staged change is kept, applied or not
    pub retention: Duration,
    /// How long a cached resource snapshot lives
    pub resource_ttl: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            resource_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Stats are a summary; they outlive the changes they describe.
const STATS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// A change as kept in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StagedChange {
    #[serde(flatten)]
    change: OfflineChange,
    /// Server time the change was queued; anchors the retention window
    queued_at: Timestamp,
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Changes applied to their resource service
    pub applied: Vec<ChangeId>,
    /// Changes that lost to a later server event
    pub superseded: Vec<ChangeId>,
    /// Changes whose replay failed; left unapplied for the next pass
    pub failed: Vec<ChangeId>,
}

impl ReplayReport {
    /// Number of changes looked at.
    pub fn total(&self) -> usize {
        self.applied.len() + self.superseded.len() + self.failed.len()
    }
}

/// The offline change queue.
pub struct OfflineQueue {
    cache: Arc<dyn Cache>,
    delta: Arc<DeltaSync>,
    locks: Arc<KeyedLocks>,
    options: QueueOptions,
}

impl OfflineQueue {
    pub fn new(
        cache: Arc<dyn Cache>,
        delta: Arc<DeltaSync>,
        locks: Arc<KeyedLocks>,
        options: QueueOptions,
    ) -> Self {
        Self {
            cache,
            delta,
            locks,
            options,
        }
    }

    /// Membership test against the change type whitelist.
    pub fn validate_change_type(&self, change_type: &str) -> bool {
        validate_change_type(change_type)
    }

    /// Stage a change for later replay.
    ///
    /// An unknown change type fails with `InvalidChangeType` before anything is
    /// written.
    pub async fn queue_offline_change(&self, change: NewOfflineChange) -> Result<OfflineChange> {
        let change = change.validate(uuid::Uuid::new_v4().to_string())?;
        let staged = StagedChange {
            change,
            queued_at: now_millis(),
        };

        let _guard = self
            .locks
            .lock(&KeyedLocks::queue_key(&staged.change.user_id))
            .await;

        let user_id = staged.change.user_id.as_str();
        self.cache
            .set(
                &keys::queued_change(user_id, &staged.change.id),
                serde_json::to_string(&staged)?,
                self.options.retention,
            )
            .await?;

        let mut index = self.load_index(user_id).await?;
        index.push(staged.change.id.clone());
        self.save_index(user_id, &index).await?;

        self.update_stats(user_id, |stats| stats.queued_changes += 1)
            .await?;

        tracing::info!(
            user_id = %user_id,
            device_id = %staged.change.device_id,
            change_id = %staged.change.id,
            change_type = %staged.change.change_type,
            "Offline change queued"
        );
        Ok(staged.change)
    }

    /// All retained changes of a user, applied or not, in replay order.
    pub async fn list_changes(&self, user_id: &str) -> Result<Vec<OfflineChange>> {
        let _guard = self.locks.lock(&KeyedLocks::queue_key(user_id)).await;
        Ok(self
            .load_staged(user_id)
            .await?
            .into_iter()
            .map(|s| s.change)
            .collect())
    }

    /// Unapplied changes of a user, optionally only those of one device.
    pub async fn pending_changes(
        &self,
        user_id: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<OfflineChange>> {
        Ok(self
            .list_changes(user_id)
            .await?
            .into_iter()
            .filter(|c| !c.applied && device_id.map_or(true, |d| c.device_id == d))
            .collect())
    }

    /// Replay the unapplied changes of a user (optionally one device only).
    ///
    /// Each change is applied under its resource lock. Failures are logged and
    /// leave the change unapplied; they never fail the call. Concurrent replays
    /// for the same user are serialized.
    pub async fn process_offline_queue(
        &self,
        user_id: &str,
        device_id: Option<&str>,
    ) -> Result<ReplayReport> {
        let _guard = self.locks.lock(&KeyedLocks::queue_key(user_id)).await;

        let staged = self.load_staged(user_id).await?;
        let mut report = ReplayReport::default();

        for mut entry in staged {
            if entry.change.applied
                || device_id.is_some_and(|d| entry.change.device_id != d)
            {
                continue;
            }

            let change_id = entry.change.id.clone();
            match self.delta.replay_change(&entry.change).await {
                Ok(ReplayOutcome::Applied(event)) => {
                    tracing::debug!(
                        change_id = %change_id,
                        event_id = event.id,
                        "Offline change applied"
                    );
                    report.applied.push(change_id);
                }
                Ok(ReplayOutcome::Superseded { winner }) => {
                    tracing::info!(
                        change_id = %change_id,
                        resource_id = %entry.change.resource_id,
                        winner,
                        "Offline change superseded by later server event"
                    );
                    report.superseded.push(change_id);
                }
                Err(e) => {
                    tracing::warn!(
                        change_id = %change_id,
                        resource_id = %entry.change.resource_id,
                        error = %e,
                        "Offline change replay failed, will retry"
                    );
                    report.failed.push(change_id);
                    continue;
                }
            }

            entry.change.applied = true;
            if let Err(e) = self.store_staged(&entry).await {
                // Replay is at-least-once; the next pass re-applies idempotently.
                tracing::warn!(change_id = %entry.change.id, error = %e, "Failed to mark change applied");
            }
        }

        let remaining = self
            .load_staged(user_id)
            .await?
            .iter()
            .filter(|s| !s.change.applied)
            .count() as u64;
        self.update_stats(user_id, |stats| stats.queued_changes = remaining)
            .await?;

        tracing::info!(
            user_id = %user_id,
            applied = report.applied.len(),
            superseded = report.superseded.len(),
            failed = report.failed.len(),
            remaining,
            "Offline queue processed"
        );
        Ok(report)
    }

    /// Cache a snapshot of a resource for offline reads.
    pub async fn cache_resource(
        &self,
        user_id: &str,
        resource_id: &str,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let key = keys::resource(user_id, resource_id);
        let encoded = serde_json::to_string(snapshot)?;
        let size = encoded.len() as u64;

        let _guard = self.locks.lock(&KeyedLocks::queue_key(user_id)).await;
        let previous = self.cache.get(&key).await?;
        self.cache
            .set(&key, encoded, self.options.resource_ttl)
            .await?;

        self.update_stats(user_id, |stats| {
            match &previous {
                Some(old) => {
                    stats.cache_size = stats.cache_size.saturating_sub(old.len() as u64);
                }
                None => stats.cached_resources += 1,
            }
            stats.cache_size += size;
        })
        .await
    }

    /// Cached snapshot of a resource. A miss is `NotCached`.
    pub async fn cached_resource(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<serde_json::Value> {
        let key = keys::resource(user_id, resource_id);
        match self.cache.get(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(AppError::NotCached(key)),
        }
    }

    /// Current cache stats of a user.
    pub async fn stats(&self, user_id: &str) -> Result<CacheStats> {
        match self.cache.get(&keys::stats(user_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(CacheStats::default()),
        }
    }

    /// Record a completed sync in the stats.
    pub async fn record_sync(&self, user_id: &str, at: Timestamp) -> Result<CacheStats> {
        let _guard = self.locks.lock(&KeyedLocks::queue_key(user_id)).await;
        self.update_stats(user_id, |stats| stats.last_sync = Some(at))
            .await?;
        self.stats(user_id).await
    }

    /// Drop every staged change and the stats of a user.
    ///
    /// Returns how many changes were removed.
    pub async fn clear(&self, user_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(&KeyedLocks::queue_key(user_id)).await;

        let index = self.load_index(user_id).await?;
        for change_id in &index {
            self.cache
                .delete(&keys::queued_change(user_id, change_id))
                .await?;
        }
        self.cache.delete(&keys::queue_index(user_id)).await?;
        self.cache.delete(&keys::stats(user_id)).await?;

        tracing::info!(user_id = %user_id, removed = index.len(), "Offline queue cleared");
        Ok(index.len())
    }

    // Callers hold the user's queue lock for everything below.

    async fn load_index(&self, user_id: &str) -> Result<Vec<ChangeId>> {
        match self.cache.get(&keys::queue_index(user_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_index(&self, user_id: &str, index: &[ChangeId]) -> Result<()> {
        let key = keys::queue_index(user_id);
        if index.is_empty() {
            return self.cache.delete(&key).await;
        }
        self.cache
            .set(&key, serde_json::to_string(index)?, self.options.retention)
            .await
    }

    /// Load every retained change through the index, in replay order.
    ///
    /// Ids whose entry has expired are pruned from the index.
    async fn load_staged(&self, user_id: &str) -> Result<Vec<StagedChange>> {
        let index = self.load_index(user_id).await?;
        let mut staged = Vec::with_capacity(index.len());
        let mut live_ids = Vec::with_capacity(index.len());

        for change_id in &index {
            let Some(raw) = self
                .cache
                .get(&keys::queued_change(user_id, change_id))
                .await?
            else {
                continue;
            };
            match serde_json::from_str::<StagedChange>(&raw) {
                Ok(entry) => {
                    live_ids.push(change_id.clone());
                    staged.push(entry);
                }
                Err(e) => {
                    tracing::warn!(change_id = %change_id, error = %e, "Dropping unreadable offline change");
                }
            }
        }

        if live_ids.len() != index.len() {
            tracing::debug!(
                user_id = %user_id,
                pruned = index.len() - live_ids.len(),
                "Pruned expired offline changes from index"
            );
            self.save_index(user_id, &live_ids).await?;
        }

        // Timestamp order. `staged` is in index order and the sort is stable,
        // so equal timestamps of one device keep the order they were queued in.
        staged.sort_by(|a, b| {
            a.change
                .timestamp
                .cmp(&b.change.timestamp)
                .then_with(|| a.change.device_id.cmp(&b.change.device_id))
        });
        Ok(staged)
    }

    /// Rewrite a staged change without extending its retention window.
    async fn store_staged(&self, entry: &StagedChange) -> Result<()> {
        let age = Duration::from_millis(now_millis().saturating_sub(entry.queued_at));
        let Some(remaining) = self.options.retention.checked_sub(age) else {
            return Ok(());
        };
        self.cache
            .set(
                &keys::queued_change(&entry.change.user_id, &entry.change.id),
                serde_json::to_string(entry)?,
                remaining,
            )
            .await
    }

    async fn update_stats(&self, user_id: &str, f: impl FnOnce(&mut CacheStats)) -> Result<()> {
        let mut stats = self.stats(user_id).await?;
        f(&mut stats);
        self.cache
            .set(&keys::stats(user_id), serde_json::to_string(&stats)?, STATS_TTL)
            .await
    }
}
