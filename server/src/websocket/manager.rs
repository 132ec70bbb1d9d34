//! WebSocket connection manager.
//!
//! Tracks live device connections and routes outbound messages to them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::OutboundMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<OutboundMessage>;

/// A single device connection.
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub sender: MessageSender,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Connection IDs of each user.
    by_user: DashMap<String, Vec<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a device connection. Returns the connection ID.
    pub fn register(&self, user_id: &str, device_id: &str, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
                sender,
            },
        );
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .push(conn_id.clone());

        tracing::info!(
            conn_id = %conn_id,
            user_id = %user_id,
            device_id = %device_id,
            devices = self.device_count(user_id),
            "WebSocket connection registered"
        );
        conn_id
    }

    pub fn unregister(&self, conn_id: &str) {
        let Some((_, conn)) = self.connections.remove(conn_id) else {
            return;
        };

        if let Some(mut conn_ids) = self.by_user.get_mut(&conn.user_id) {
            conn_ids.retain(|id| id != conn_id);
            if conn_ids.is_empty() {
                drop(conn_ids);
                self.by_user.remove_if(&conn.user_id, |_, ids| ids.is_empty());
            }
        }

        tracing::info!(
            conn_id = %conn_id,
            user_id = %conn.user_id,
            devices = self.device_count(&conn.user_id),
            "WebSocket connection unregistered"
        );
    }

    /// Queue a message on one connection. Returns false if it is gone.
    pub fn send_to(&self, conn_id: &str, message: OutboundMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections a user has open.
    pub fn device_count(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map_or(0, |ids| ids.len())
    }
}
