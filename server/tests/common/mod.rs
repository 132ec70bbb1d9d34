//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marksync_engine::{NewEvent, NewOfflineChange, ResourceKind, Timestamp};
use marksync_server::cache::MemoryCache;
use marksync_server::config::Config;
use marksync_server::db::MemoryEventStore;
use marksync_server::error::{AppError, Result};
use marksync_server::handlers::StaticProbe;
use marksync_server::resources::{MemoryResources, ResourceMutator, ResourceRegistry};
use marksync_server::{now_millis, AppState};
use serde_json::Value;

pub const USER: &str = "user-1";

/// Bookmark service that refuses to touch selected resources.
#[derive(Default)]
pub struct FlakyResources {
    pub inner: MemoryResources,
    broken: Mutex<HashSet<String>>,
}

impl FlakyResources {
    pub fn break_resource(&self, resource_id: &str) {
        self.broken.lock().unwrap().insert(resource_id.to_string());
    }

    pub fn repair_resource(&self, resource_id: &str) {
        self.broken.lock().unwrap().remove(resource_id);
    }

    fn check(&self, resource_id: &str) -> Result<()> {
        if self.broken.lock().unwrap().contains(resource_id) {
            return Err(AppError::Mutation(format!("{} is unavailable", resource_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceMutator for FlakyResources {
    async fn create(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()> {
        self.check(resource_id)?;
        self.inner.create(user_id, resource_id, payload).await
    }

    async fn update(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()> {
        self.check(resource_id)?;
        self.inner.update(user_id, resource_id, payload).await
    }

    async fn delete(&self, user_id: &str, resource_id: &str) -> Result<()> {
        self.check(resource_id)?;
        self.inner.delete(user_id, resource_id).await
    }
}

pub struct Harness {
    pub state: AppState,
    pub bookmarks: Arc<FlakyResources>,
    pub probe: Arc<StaticProbe>,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let bookmarks = Arc::new(FlakyResources::default());
    let probe = Arc::new(StaticProbe::new(true));
    let resources = ResourceRegistry::new()
        .register(ResourceKind::Bookmark, bookmarks.clone())
        .register(ResourceKind::Collection, Arc::new(MemoryResources::new()));

    let state = AppState::new(
        config,
        Arc::new(MemoryEventStore::new()),
        Arc::new(MemoryCache::new()),
        resources,
        probe.clone(),
    );

    Harness {
        state,
        bookmarks,
        probe,
    }
}

/// A bookmark event `ago_ms` before now.
pub fn bookmark_event(resource_id: &str, action: &str, device_id: &str, ago_ms: Timestamp, payload: Value) -> NewEvent {
    NewEvent {
        category: format!("bookmark_{}", action),
        user_id: USER.into(),
        resource_id: resource_id.into(),
        action: action.into(),
        payload,
        device_id: device_id.into(),
        timestamp: now_millis() - ago_ms,
    }
}

pub fn offline_change(change_type: &str, resource_id: &str, device_id: &str, timestamp: Timestamp, payload: Value) -> NewOfflineChange {
    NewOfflineChange {
        user_id: USER.into(),
        device_id: device_id.into(),
        change_type: change_type.into(),
        resource_id: resource_id.into(),
        payload,
        timestamp,
    }
}
