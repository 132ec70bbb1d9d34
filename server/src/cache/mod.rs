//! Cache collaborator.
//!
//! The sync core keeps resource snapshots, staged offline changes, per-user
//! status and stats in a key/value store with expiring entries. Only the narrow
//! get/set/delete/exists contract is required, so any backend can be plugged in.

mod memory;

pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Fetch a live value. `None` means not cached (missing or expired).
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a live value exists.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Key builders for the namespaces used by the sync core.
pub mod keys {
    /// Cached resource snapshot.
    pub fn resource(user_id: &str, resource_id: &str) -> String {
        format!("offline:bookmark:{}:{}", user_id, resource_id)
    }

    /// One staged offline change.
    pub fn queued_change(user_id: &str, change_id: &str) -> String {
        format!("offline:queue:{}:{}", user_id, change_id)
    }

    /// Ordered index of a user's staged change ids.
    pub fn queue_index(user_id: &str) -> String {
        format!("offline:index:{}", user_id)
    }

    /// Online/offline status.
    pub fn status(user_id: &str) -> String {
        format!("offline:status:{}", user_id)
    }

    /// Cache stats summary.
    pub fn stats(user_id: &str) -> String {
        format!("offline:stats:{}", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn key_namespaces() {
        assert_eq!(keys::resource("u1", "b1"), "offline:bookmark:u1:b1");
        assert_eq!(keys::queued_change("u1", "c1"), "offline:queue:u1:c1");
        assert_eq!(keys::queue_index("u1"), "offline:index:u1");
        assert_eq!(keys::status("u1"), "offline:status:u1");
        assert_eq!(keys::stats("u1"), "offline:stats:u1");
    }
}
