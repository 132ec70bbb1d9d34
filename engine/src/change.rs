//! Offline change types.
//!
//! An offline change is a staged mutation that is not authoritative until it
//! has been replayed against the owning resource service.

use crate::{error::Result, ChangeId, DeviceId, Error, EventAction, ResourceId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of resources a change can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Bookmark,
    Collection,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bookmark => "bookmark",
            ResourceKind::Collection => "collection",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(ResourceKind::Bookmark),
            "collection" => Ok(ResourceKind::Collection),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The whitelisted change types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    BookmarkCreate,
    BookmarkUpdate,
    BookmarkDelete,
    CollectionCreate,
    CollectionUpdate,
    CollectionDelete,
}

impl ChangeType {
    pub const ALL: [ChangeType; 6] = [
        ChangeType::BookmarkCreate,
        ChangeType::BookmarkUpdate,
        ChangeType::BookmarkDelete,
        ChangeType::CollectionCreate,
        ChangeType::CollectionUpdate,
        ChangeType::CollectionDelete,
    ];

    /// Resource kind this change targets.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ChangeType::BookmarkCreate | ChangeType::BookmarkUpdate | ChangeType::BookmarkDelete => {
                ResourceKind::Bookmark
            }
            ChangeType::CollectionCreate
            | ChangeType::CollectionUpdate
            | ChangeType::CollectionDelete => ResourceKind::Collection,
        }
    }

    /// Verb of this change.
    pub fn action(&self) -> EventAction {
        match self {
            ChangeType::BookmarkCreate | ChangeType::CollectionCreate => EventAction::Create,
            ChangeType::BookmarkUpdate | ChangeType::CollectionUpdate => EventAction::Update,
            ChangeType::BookmarkDelete | ChangeType::CollectionDelete => EventAction::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::BookmarkCreate => "bookmark_create",
            ChangeType::BookmarkUpdate => "bookmark_update",
            ChangeType::BookmarkDelete => "bookmark_delete",
            ChangeType::CollectionCreate => "collection_create",
            ChangeType::CollectionUpdate => "collection_update",
            ChangeType::CollectionDelete => "collection_delete",
        }
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ChangeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidChangeType(s.to_string()))
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership test against the change type whitelist. Fails closed.
pub fn validate_change_type(change_type: &str) -> bool {
    change_type.parse::<ChangeType>().is_ok()
}

/// A mutation staged while its device was disconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineChange {
    pub id: ChangeId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Device wall-clock time of the local mutation, in milliseconds
    pub timestamp: Timestamp,
    /// Set once replay succeeded (or the change was superseded)
    #[serde(default)]
    pub applied: bool,
}

impl OfflineChange {
    /// Event category recorded when this change is replayed.
    pub fn category(&self) -> &'static str {
        self.change_type.as_str()
    }
}

/// A change as reported by a device, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOfflineChange {
    pub user_id: UserId,
    pub device_id: DeviceId,
    #[serde(rename = "type")]
    pub change_type: String,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl NewOfflineChange {
    /// Validate the change type and timestamp and stage the change under `id`.
    pub fn validate(self, id: impl Into<ChangeId>) -> Result<OfflineChange> {
        let change_type = self.change_type.parse::<ChangeType>()?;
        let timestamp = crate::check_timestamp(self.timestamp)?;
        Ok(OfflineChange {
            id: id.into(),
            user_id: self.user_id,
            device_id: self.device_id,
            change_type,
            resource_id: self.resource_id,
            payload: self.payload,
            timestamp,
            applied: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitelist() {
        for t in ChangeType::ALL {
            assert!(validate_change_type(t.as_str()), "{} should be valid", t);
        }
        assert!(validate_change_type("bookmark_create"));
        assert!(!validate_change_type("anything_else"));
        assert!(!validate_change_type(""));
        assert!(!validate_change_type("BOOKMARK_CREATE"));
        assert!(!validate_change_type("tag_create"));
    }

    #[test]
    fn kind_and_action() {
        assert_eq!(ChangeType::BookmarkUpdate.kind(), ResourceKind::Bookmark);
        assert_eq!(ChangeType::BookmarkUpdate.action(), EventAction::Update);
        assert_eq!(ChangeType::CollectionDelete.kind(), ResourceKind::Collection);
        assert_eq!(ChangeType::CollectionDelete.action(), EventAction::Delete);
        assert_eq!(ChangeType::CollectionCreate.action(), EventAction::Create);
    }

    #[test]
    fn validate_new_change() {
        let change = NewOfflineChange {
            user_id: "user-1".into(),
            device_id: "phone".into(),
            change_type: "collection_create".into(),
            resource_id: "c-1".into(),
            payload: json!({"name": "Reading"}),
            timestamp: 42,
        }
        .validate("chg-1")
        .unwrap();

        assert_eq!(change.id, "chg-1");
        assert_eq!(change.change_type, ChangeType::CollectionCreate);
        assert!(!change.applied);
        assert_eq!(change.category(), "collection_create");
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let err = NewOfflineChange {
            user_id: "user-1".into(),
            device_id: "phone".into(),
            change_type: "bookmark_move".into(),
            resource_id: "b-1".into(),
            payload: json!(null),
            timestamp: 42,
        }
        .validate("chg-1")
        .unwrap_err();

        assert_eq!(err, Error::InvalidChangeType("bookmark_move".into()));
    }

    #[test]
    fn validate_rejects_unstorable_timestamp() {
        let err = NewOfflineChange {
            user_id: "user-1".into(),
            device_id: "phone".into(),
            change_type: "bookmark_update".into(),
            resource_id: "b-1".into(),
            payload: json!({}),
            timestamp: crate::MAX_TIMESTAMP + 1,
        }
        .validate("chg-1")
        .unwrap_err();

        assert_eq!(err, Error::InvalidTimestamp(1 << 63));
    }

    #[test]
    fn serialization_format() {
        let change = OfflineChange {
            id: "chg-1".into(),
            user_id: "u".into(),
            device_id: "d".into(),
            change_type: ChangeType::BookmarkDelete,
            resource_id: "b-1".into(),
            payload: json!(null),
            timestamp: 1,
            applied: true,
        };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains(r#""type":"bookmark_delete""#));

        let parsed: OfflineChange = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, change);
    }
}
