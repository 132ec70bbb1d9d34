//! Resource-mutation collaborators.
//!
//! Bookmarks and collections are owned by their own services. The sync core
//! only invokes their create/update/delete entry points while replaying offline
//! changes or applying a direct mutation, dispatching on the change's resource
//! kind through an explicit handler table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use marksync_engine::{ChangeType, EventAction, ResourceKind};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Mutation entry points of one resource service.
///
/// Replay is at-least-once, so implementations must tolerate repeats: create
/// should be create-if-absent and delete of a missing resource should succeed.
#[async_trait]
pub trait ResourceMutator: Send + Sync {
    async fn create(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()>;

    async fn update(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()>;

    async fn delete(&self, user_id: &str, resource_id: &str) -> Result<()>;
}

/// Handler table from resource kind to its service.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ResourceMutator>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the service for a kind, replacing any previous one.
    pub fn register(mut self, kind: ResourceKind, mutator: Arc<dyn ResourceMutator>) -> Self {
        self.handlers.insert(kind, mutator);
        self
    }

    /// Check whether a kind has a handler.
    pub fn handles(&self, kind: ResourceKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Invoke the entry point matching `kind` and `action`.
    pub async fn apply(
        &self,
        kind: ResourceKind,
        action: EventAction,
        user_id: &str,
        resource_id: &str,
        payload: &Value,
    ) -> Result<()> {
        let handler = self.handlers.get(&kind).ok_or(AppError::NoHandler(kind))?;

        match action {
            EventAction::Create => handler.create(user_id, resource_id, payload).await,
            EventAction::Update => handler.update(user_id, resource_id, payload).await,
            EventAction::Delete => handler.delete(user_id, resource_id).await,
        }
    }

    /// Dispatch a whitelisted change type.
    pub async fn dispatch(
        &self,
        change_type: ChangeType,
        user_id: &str,
        resource_id: &str,
        payload: &Value,
    ) -> Result<()> {
        self.apply(
            change_type.kind(),
            change_type.action(),
            user_id,
            resource_id,
            payload,
        )
        .await
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-process resource service keeping the latest document per resource.
///
/// Updates merge top-level fields into the existing document; an update of a
/// missing resource creates it.
#[derive(Debug, Default)]
pub struct MemoryResources {
    documents: DashMap<(String, String), Value>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Current document of a resource.
    pub fn get(&self, user_id: &str, resource_id: &str) -> Option<Value> {
        self.documents
            .get(&(user_id.to_string(), resource_id.to_string()))
            .map(|doc| doc.clone())
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if no resource exists.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl ResourceMutator for MemoryResources {
    async fn create(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()> {
        self.documents
            .entry((user_id.to_string(), resource_id.to_string()))
            .or_insert_with(|| payload.clone());
        Ok(())
    }

    async fn update(&self, user_id: &str, resource_id: &str, payload: &Value) -> Result<()> {
        let mut doc = self
            .documents
            .entry((user_id.to_string(), resource_id.to_string()))
            .or_insert_with(|| Value::Object(Default::default()));

        match (doc.value_mut(), payload) {
            (Value::Object(existing), Value::Object(changes)) => {
                for (field, value) in changes {
                    existing.insert(field.clone(), value.clone());
                }
            }
            (existing, _) => *existing = payload.clone(),
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, resource_id: &str) -> Result<()> {
        self.documents
            .remove(&(user_id.to_string(), resource_id.to_string()));
        Ok(())
    }
}
