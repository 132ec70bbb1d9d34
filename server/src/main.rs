//! marksync server binary.
//!
//! Serves the sync HTTP and WebSocket endpoints. Events go to PostgreSQL when
//! `DATABASE_URL` is set and to an in-memory log otherwise.

use std::sync::Arc;
use std::time::Duration;

use marksync_engine::ResourceKind;
use marksync_server::cache::MemoryCache;
use marksync_server::config::Config;
use marksync_server::db::{self, EventStore, MemoryEventStore, PgEventStore};
use marksync_server::handlers::HttpProbe;
use marksync_server::resources::{MemoryResources, ResourceRegistry};
use marksync_server::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marksync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting marksync server on {}:{}", config.host, config.port);

    let store: Arc<dyn EventStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            Arc::new(PgEventStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory only");
            Arc::new(MemoryEventStore::new())
        }
    };

    let resources = ResourceRegistry::new()
        .register(ResourceKind::Bookmark, Arc::new(MemoryResources::new()))
        .register(ResourceKind::Collection, Arc::new(MemoryResources::new()));
    let probe = Arc::new(HttpProbe::new(
        config.probe_urls.clone(),
        config.probe_timeout,
    )?);
    tracing::info!(targets = ?probe.targets(), "Reachability probe configured");

    let cache = Arc::new(MemoryCache::new());
    let sweeper = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = sweeper.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, store, cache, resources, probe);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
