//! Connectivity monitor.
//!
//! Tracks a per-user online/offline status in the cache and decides when the
//! offline queue may be replayed. Reachability is answered by a pluggable
//! [`ReachabilityProbe`], always bounded by the probe timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::select_ok;
use serde::{Deserialize, Serialize};

use super::offline::{OfflineQueue, ReplayReport};
use crate::cache::{keys, Cache};
use crate::error::{AppError, Result};
use crate::now_millis;

/// Answers whether the outside world is reachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn reachable(&self) -> bool;
}

/// Probe that issues HTTP GETs against a set of targets.
///
/// Any target answering, whatever the status code, counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    targets: Vec<String>,
}

impl HttpProbe {
    pub fn new(targets: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("probe client: {}", e)))?;
        Ok(Self { client, targets })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn reachable(&self) -> bool {
        if self.targets.is_empty() {
            return false;
        }

        let requests = self
            .targets
            .iter()
            .map(|target| Box::pin(self.client.get(target).send()));

        match select_ok(requests).await {
            Ok((response, _)) => {
                tracing::trace!(url = %response.url(), status = %response.status(), "Probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "No probe target reachable");
                false
            }
        }
    }
}

/// Probe with a fixed, switchable answer.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Online/offline status of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    #[default]
    Online,
    Offline,
}

impl ConnectivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityStatus::Online => "online",
            ConnectivityStatus::Offline => "offline",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(ConnectivityStatus::Online),
            "offline" => Some(ConnectivityStatus::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    /// Bound on a single reachability check
    pub probe_timeout: Duration,
    /// How long a stored status is trusted
    pub status_ttl: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            status_ttl: Duration::from_secs(60 * 60),
        }
    }
}

pub struct ConnectivityMonitor {
    cache: Arc<dyn Cache>,
    probe: Arc<dyn ReachabilityProbe>,
    offline: Arc<OfflineQueue>,
    options: MonitorOptions,
}

impl ConnectivityMonitor {
    pub fn new(
        cache: Arc<dyn Cache>,
        probe: Arc<dyn ReachabilityProbe>,
        offline: Arc<OfflineQueue>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            cache,
            probe,
            offline,
            options,
        }
    }

    /// Cached status of a user. Nothing cached means online.
    pub async fn status(&self, user_id: &str) -> Result<ConnectivityStatus> {
        let Some(raw) = self.cache.get(&keys::status(user_id)).await? else {
            return Ok(ConnectivityStatus::Online);
        };

        Ok(ConnectivityStatus::parse(&raw).unwrap_or_else(|| {
            tracing::warn!(user_id = %user_id, value = %raw, "Unreadable status, assuming online");
            ConnectivityStatus::Online
        }))
    }

    pub async fn set_status(&self, user_id: &str, status: ConnectivityStatus) -> Result<()> {
        self.cache
            .set(
                &keys::status(user_id),
                status.as_str().to_string(),
                self.options.status_ttl,
            )
            .await?;
        tracing::debug!(user_id = %user_id, status = %status, "Connectivity status set");
        Ok(())
    }

    /// Probe reachability. A probe that fails or runs past the timeout
    /// reports offline.
    pub async fn check_connectivity(&self) -> bool {
        match tokio::time::timeout(self.options.probe_timeout, self.probe.reachable()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.options.probe_timeout.as_millis() as u64,
                    "Reachability probe timed out"
                );
                false
            }
        }
    }

    /// Replay a user's offline queue once connectivity is back.
    ///
    /// Fails with `StillOffline` when the probe reports offline; the user's
    /// status is then stored as offline.
    pub async fn sync_when_online(&self, user_id: &str) -> Result<ReplayReport> {
        if !self.check_connectivity().await {
            self.set_status(user_id, ConnectivityStatus::Offline).await?;
            return Err(AppError::StillOffline(user_id.to_string()));
        }

        self.set_status(user_id, ConnectivityStatus::Online).await?;
        let report = self.offline.process_offline_queue(user_id, None).await?;
        self.offline.record_sync(user_id, now_millis()).await?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryEventStore;
    use crate::handlers::delta::{DeltaOptions, DeltaSync};
    use crate::handlers::offline::QueueOptions;
    use crate::locks::KeyedLocks;
    use crate::resources::{MemoryResources, ResourceRegistry};
    use marksync_engine::{NewOfflineChange, ResourceKind};
    use serde_json::json;

    struct SlowProbe;

    #[async_trait]
    impl ReachabilityProbe for SlowProbe {
        async fn reachable(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        }
    }

    fn monitor(probe: Arc<dyn ReachabilityProbe>) -> (ConnectivityMonitor, Arc<OfflineQueue>) {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let locks = KeyedLocks::new_shared();
        let registry = ResourceRegistry::new()
            .register(ResourceKind::Bookmark, Arc::new(MemoryResources::new()));
        let delta = Arc::new(DeltaSync::new(
            Arc::new(MemoryEventStore::new()),
            registry,
            locks.clone(),
            DeltaOptions::default(),
        ));
        let offline = Arc::new(OfflineQueue::new(
            cache.clone(),
            delta,
            locks,
            QueueOptions::default(),
        ));
        let monitor = ConnectivityMonitor::new(
            cache,
            probe,
            offline.clone(),
            MonitorOptions {
                probe_timeout: Duration::from_millis(50),
                ..MonitorOptions::default()
            },
        );
        (monitor, offline)
    }

    #[tokio::test]
    async fn status_defaults_to_online() {
        let (monitor, _) = monitor(Arc::new(StaticProbe::new(true)));
        assert_eq!(monitor.status("u").await.unwrap(), ConnectivityStatus::Online);

        monitor.set_status("u", ConnectivityStatus::Offline).await.unwrap();
        assert_eq!(monitor.status("u").await.unwrap(), ConnectivityStatus::Offline);
        assert_eq!(monitor.status("other").await.unwrap(), ConnectivityStatus::Online);
    }

    #[tokio::test]
    async fn probe_timeout_means_offline() {
        let (monitor, _) = monitor(Arc::new(SlowProbe));
        assert!(!monitor.check_connectivity().await);
    }

    #[tokio::test]
    async fn http_probe_without_targets_is_unreachable() {
        let probe = HttpProbe::new(Vec::new(), Duration::from_millis(10)).unwrap();
        assert!(!probe.reachable().await);
    }

    #[tokio::test]
    async fn sync_when_offline_fails_and_keeps_queue() {
        let probe = Arc::new(StaticProbe::new(false));
        let (monitor, offline) = monitor(probe.clone());

        offline
            .queue_offline_change(NewOfflineChange {
                user_id: "u".into(),
                device_id: "phone".into(),
                change_type: "bookmark_create".into(),
                resource_id: "b-1".into(),
                payload: json!({"title": "Offline"}),
                timestamp: 1,
            })
            .await
            .unwrap();

        let err = monitor.sync_when_online("u").await.unwrap_err();
        assert!(matches!(err, AppError::StillOffline(_)));
        assert_eq!(monitor.status("u").await.unwrap(), ConnectivityStatus::Offline);
        assert_eq!(offline.pending_changes("u", None).await.unwrap().len(), 1);

        probe.set_online(true);
        let report = monitor.sync_when_online("u").await.unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(monitor.status("u").await.unwrap(), ConnectivityStatus::Online);
        assert!(offline.stats("u").await.unwrap().last_sync.is_some());
    }
}
