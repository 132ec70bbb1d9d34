//! Delta sync - records events and serves each device what it has not seen.
//!
//! Every write path that ends in the event store goes through here, holding
//! the (user, resource) lock for the whole check-mutate-append sequence.

use std::sync::Arc;
use std::time::Duration;

use marksync_engine::{
    arbitrate, optimize_events, resolve_since, Authority, EventId, EventStatus, NewEvent,
    OfflineChange, ResourceKind, SyncEvent, SyncState, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::db::EventStore;
use crate::error::{AppError, Result};
use crate::locks::KeyedLocks;
use crate::resources::ResourceRegistry;

/// Tunables of the delta engine.
#[derive(Debug, Clone, Copy)]
pub struct DeltaOptions {
    /// Lookback used when the device reports no usable watermark
    pub lookback: Duration,
    /// Leave the requesting device's own events out of its delta
    pub exclude_own_events: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(24 * 60 * 60),
            exclude_own_events: false,
        }
    }
}

/// Result of a delta query, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Optimized events, ascending by timestamp
    pub events: Vec<SyncEvent>,
    /// Watermark to store once the events have been delivered
    pub state: SyncState,
}

impl Delta {
    /// Ids of the delivered events.
    pub fn event_ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id).collect()
    }
}

/// What happened to a replayed offline change.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The change was applied and recorded as this event
    Applied(SyncEvent),
    /// A later server event already owns the resource
    Superseded { winner: EventId },
}

/// The delta sync engine.
pub struct DeltaSync {
    store: Arc<dyn EventStore>,
    resources: ResourceRegistry,
    locks: Arc<KeyedLocks>,
    options: DeltaOptions,
}

impl DeltaSync {
    pub fn new(
        store: Arc<dyn EventStore>,
        resources: ResourceRegistry,
        locks: Arc<KeyedLocks>,
        options: DeltaOptions,
    ) -> Self {
        Self {
            store,
            resources,
            locks,
            options,
        }
    }

    /// Record an event that was already applied elsewhere.
    ///
    /// Fails with `InvalidAction` before touching the store when the action is
    /// not one of create/update/delete.
    pub async fn create_sync_event(&self, event: NewEvent) -> Result<SyncEvent> {
        let draft = event.validate()?;

        let _guard = self
            .locks
            .lock(&KeyedLocks::resource_key(&draft.user_id, &draft.resource_id))
            .await;
        let stored = self.store.append(draft).await?;

        tracing::debug!(
            event_id = stored.id,
            user_id = %stored.user_id,
            resource_id = %stored.resource_id,
            action = %stored.action,
            "Sync event recorded"
        );
        Ok(stored)
    }

    /// Apply a mutation from a connected device and record it.
    ///
    /// A kind without a registered service fails with `NoHandler` before the
    /// event is validated or the resource locked.
    pub async fn apply_mutation(&self, kind: ResourceKind, event: NewEvent) -> Result<SyncEvent> {
        if !self.resources.handles(kind) {
            return Err(AppError::NoHandler(kind));
        }
        let draft = event.validate()?;

        let _guard = self
            .locks
            .lock(&KeyedLocks::resource_key(&draft.user_id, &draft.resource_id))
            .await;

        self.resources
            .apply(
                kind,
                draft.action,
                &draft.user_id,
                &draft.resource_id,
                &draft.payload,
            )
            .await?;
        let stored = self.store.append(draft).await?;

        tracing::debug!(
            event_id = stored.id,
            user_id = %stored.user_id,
            resource_id = %stored.resource_id,
            kind = %kind,
            "Direct mutation applied"
        );
        Ok(stored)
    }

    /// Replay one offline change against its resource service.
    ///
    /// The change is arbitrated against the latest stored event for the same
    /// resource. If the server side wins nothing is mutated; otherwise the
    /// change is applied and recorded with its original device and timestamp.
    pub async fn replay_change(&self, change: &OfflineChange) -> Result<ReplayOutcome> {
        let _guard = self
            .locks
            .lock(&KeyedLocks::resource_key(&change.user_id, &change.resource_id))
            .await;

        if let Some(latest) = self
            .store
            .latest_for_resource(&change.user_id, &change.resource_id)
            .await?
        {
            if arbitrate(change, &latest) == Authority::Server {
                return Ok(ReplayOutcome::Superseded { winner: latest.id });
            }
        }

        self.resources
            .dispatch(
                change.change_type,
                &change.user_id,
                &change.resource_id,
                &change.payload,
            )
            .await?;

        let draft = NewEvent {
            category: change.category().to_string(),
            user_id: change.user_id.clone(),
            resource_id: change.resource_id.clone(),
            action: change.change_type.action().to_string(),
            payload: change.payload.clone(),
            device_id: change.device_id.clone(),
            timestamp: change.timestamp,
        }
        .validate()?;

        Ok(ReplayOutcome::Applied(self.store.append(draft).await?))
    }

    /// Events `device_id` has not seen since `last_sync_secs`, optimized.
    ///
    /// `last_sync_secs` is unix seconds; a missing or negative value falls back
    /// to the configured lookback. The comparison is strictly greater-than.
    pub async fn get_delta_sync(
        &self,
        user_id: &str,
        device_id: &str,
        last_sync_secs: Option<i64>,
        now: Timestamp,
    ) -> Result<Delta> {
        let lookback = u64::try_from(self.options.lookback.as_millis()).unwrap_or(u64::MAX);
        let since = resolve_since(last_sync_secs, now, lookback);
        let exclude = self.options.exclude_own_events.then_some(device_id);

        let candidates = self.store.events_since(user_id, since, exclude).await?;
        let fetched = candidates.len();
        let events = optimize_events(candidates);

        tracing::debug!(
            user_id = %user_id,
            device_id = %device_id,
            since,
            fetched,
            returned = events.len(),
            "Delta computed"
        );

        Ok(Delta {
            events,
            state: SyncState::new(user_id, device_id, now),
        })
    }

    /// Commit a delivered delta: mark its events synced and store the
    /// device's watermark.
    pub async fn acknowledge(&self, delta: &Delta) -> Result<()> {
        let ids = delta.event_ids();
        let marked = self.store.set_status(&ids, EventStatus::Synced).await?;
        self.store.save_sync_state(&delta.state).await?;

        tracing::debug!(
            user_id = %delta.state.user_id,
            device_id = %delta.state.device_id,
            marked,
            watermark = delta.state.last_sync_time,
            "Delta acknowledged"
        );
        Ok(())
    }

    /// Stored watermark of a device.
    pub async fn sync_state(&self, user_id: &str, device_id: &str) -> Result<Option<SyncState>> {
        self.store.sync_state(user_id, device_id).await
    }
}
