//! Sync event types.
//!
//! A sync event is one durable, immutable fact about a mutation. Once an event
//! is appended to the log only its [`EventStatus`] may change.

use crate::{error::Result, DeviceId, Error, EventId, ResourceId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The verb of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl EventAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

impl FromStr for EventAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(EventAction::Create),
            "update" => Ok(EventAction::Update),
            "delete" => Ok(EventAction::Delete),
            other => Err(Error::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Recorded, not yet delivered to any device
    #[default]
    Pending,
    /// Delivered to at least one requesting device
    Synced,
    /// Delivery failed
    Failed,
}

impl EventStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Synced => "synced",
            EventStatus::Failed => "failed",
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "synced" => Ok(EventStatus::Synced),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status: {}", other)),
        }
    }
}

/// A recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Assigned by the event store, strictly increasing
    pub id: EventId,
    /// Resource kind plus verb, e.g. `bookmark_update`
    #[serde(rename = "type")]
    pub category: String,
    /// Owning user
    pub user_id: UserId,
    /// Resource this event mutates
    pub resource_id: ResourceId,
    /// What happened to the resource
    pub action: EventAction,
    /// Serialized resource delta
    pub payload: serde_json::Value,
    /// Device that produced the mutation
    pub device_id: DeviceId,
    /// Delivery status
    pub status: EventStatus,
    /// Device wall-clock time in milliseconds
    pub timestamp: Timestamp,
}

impl SyncEvent {
    /// Build the stored form of a validated draft.
    pub fn from_draft(id: EventId, draft: EventDraft) -> Self {
        Self {
            id,
            category: draft.category,
            user_id: draft.user_id,
            resource_id: draft.resource_id,
            action: draft.action,
            payload: draft.payload,
            device_id: draft.device_id,
            status: EventStatus::Pending,
            timestamp: draft.timestamp,
        }
    }

    /// Whether this event removes its resource.
    pub fn is_delete(&self) -> bool {
        self.action == EventAction::Delete
    }
}

/// An event as submitted by a caller, before validation.
///
/// The action is still a free string here; [`NewEvent::validate`] is the only
/// way to obtain an [`EventDraft`] that a store will accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub category: String,
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub device_id: DeviceId,
    pub timestamp: Timestamp,
}

impl NewEvent {
    /// Check the action and timestamp and produce an appendable draft.
    pub fn validate(self) -> Result<EventDraft> {
        let action = self.action.parse::<EventAction>()?;
        let timestamp = crate::check_timestamp(self.timestamp)?;
        Ok(EventDraft {
            category: self.category,
            user_id: self.user_id,
            resource_id: self.resource_id,
            action,
            payload: self.payload,
            device_id: self.device_id,
            timestamp,
        })
    }
}

/// A validated event that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(rename = "type")]
    pub category: String,
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub action: EventAction,
    pub payload: serde_json::Value,
    pub device_id: DeviceId,
    pub timestamp: Timestamp,
}
