//! # Marksync Engine
//!
//! Deterministic core of the marksync multi-device synchronization layer.
//!
//! This crate holds the pure logic behind delta sync: the event model, the
//! offline change vocabulary, conflict resolution and bandwidth-optimized
//! coalescing. Same inputs always produce the same outputs.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about sockets, caches or databases
//! - **Deterministic**: ties are always broken by an explicit key, never by
//!   input order
//! - **Append-only**: events are facts; only their delivery status may change
//!
//! ## Core Concepts
//!
//! ### Sync events
//!
//! Every mutation of a user's resources is recorded as a [`SyncEvent`]. A
//! deletion is itself an event with [`EventAction::Delete`], never the removal
//! of an event record.
//!
//! ### Offline changes
//!
//! Mutations made while a device is disconnected are staged as
//! [`OfflineChange`]s. Their [`ChangeType`] is a closed set, so dispatching to a
//! resource handler is checked at compile time.
//!
//! ### Resolution and coalescing
//!
//! [`resolve_conflict`] picks the authoritative candidate with a last-write-wins
//! rule (ties broken by the larger id). [`optimize_events`] collapses a batch to
//! one winner per resource, ordered by timestamp.
//!
//! ## Quick Start
//!
//! ```rust
//! use marksync_engine::{optimize_events, EventLog, NewEvent};
//! use serde_json::json;
//!
//! let mut log = EventLog::new();
//! for (ts, title) in [(1_000, "Draft"), (2_000, "Final")] {
//!     let draft = NewEvent {
//!         category: "bookmark_update".into(),
//!         user_id: "user-1".into(),
//!         resource_id: "bookmark-1".into(),
//!         action: "update".into(),
//!         payload: json!({ "title": title }),
//!         device_id: "laptop".into(),
//!         timestamp: ts,
//!     }
//!     .validate()
//!     .unwrap();
//!     log.append(draft);
//! }
//!
//! let delta = optimize_events(log.events_since("user-1", 0, None));
//! assert_eq!(delta.len(), 1);
//! assert_eq!(delta[0].payload["title"], "Final");
//! ```

pub mod change;
pub mod error;
pub mod event;
pub mod log;
pub mod optimize;
pub mod resolve;
pub mod state;
pub mod watermark;

// Re-export main types at crate root
pub use change::{validate_change_type, ChangeType, NewOfflineChange, OfflineChange, ResourceKind};
pub use error::Error;
pub use event::{EventAction, EventDraft, EventStatus, NewEvent, SyncEvent};
pub use log::EventLog;
pub use optimize::optimize_events;
pub use resolve::{arbitrate, resolve_conflict, resolve_pair, Authority, Resolvable};
pub use state::{CacheStats, SyncState};
pub use watermark::{resolve_since, DEFAULT_LOOKBACK_MS};

/// Type aliases for clarity
pub type EventId = u64;
pub type ChangeId = String;
pub type UserId = String;
pub type DeviceId = String;
pub type ResourceId = String;
/// Milliseconds since the unix epoch.
pub type Timestamp = u64;

/// Largest timestamp a store can hold (`BIGINT` column).
pub const MAX_TIMESTAMP: Timestamp = i64::MAX as Timestamp;

/// Reject timestamps a store cannot represent.
pub(crate) fn check_timestamp(timestamp: Timestamp) -> error::Result<Timestamp> {
    if timestamp > MAX_TIMESTAMP {
        return Err(Error::InvalidTimestamp(timestamp));
    }
    Ok(timestamp)
}
