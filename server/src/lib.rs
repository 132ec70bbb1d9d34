//! marksync server - multi-device sync for bookmarks and collections.
//!
//! Devices record changes as sync events, pull deltas of what they have not
//! seen, and replay changes they made while disconnected. The HTTP and
//! WebSocket surfaces are thin; the work happens in [`handlers`].

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod resources;
pub mod routes;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use marksync_engine::Timestamp;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::EventStore;
use crate::handlers::{
    ConnectivityMonitor, DeltaOptions, DeltaSync, MonitorOptions, OfflineQueue, QueueOptions,
    ReachabilityProbe,
};
use crate::locks::KeyedLocks;
use crate::resources::ResourceRegistry;
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conn_manager: Arc<ConnectionManager>,
    pub delta: Arc<DeltaSync>,
    pub offline: Arc<OfflineQueue>,
    pub connectivity: Arc<ConnectivityMonitor>,
}

impl AppState {
    /// Wire the sync services over the given collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn EventStore>,
        cache: Arc<dyn Cache>,
        resources: ResourceRegistry,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let locks = KeyedLocks::new_shared();

        let delta = Arc::new(DeltaSync::new(
            store,
            resources,
            locks.clone(),
            DeltaOptions {
                lookback: config.sync_lookback,
                exclude_own_events: config.exclude_own_events,
            },
        ));
        let offline = Arc::new(OfflineQueue::new(
            cache.clone(),
            delta.clone(),
            locks,
            QueueOptions {
                retention: config.offline_retention,
                resource_ttl: config.resource_cache_ttl,
            },
        ));
        let connectivity = Arc::new(ConnectivityMonitor::new(
            cache,
            probe,
            offline.clone(),
            MonitorOptions {
                probe_timeout: config.probe_timeout,
                status_ttl: config.status_ttl,
            },
        ));

        Self {
            config: Arc::new(config),
            conn_manager: ConnectionManager::new_shared(),
            delta,
            offline,
            connectivity,
        }
    }
}

/// Build the router with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}
