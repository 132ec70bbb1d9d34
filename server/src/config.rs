//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Reachability targets used when `PROBE_URLS` is not set.
const DEFAULT_PROBE_URLS: &[&str] = &[
    "https://www.cloudflare.com/cdn-cgi/trace",
    "https://www.google.com/generate_204",
];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; the in-memory event store is used when unset
    pub database_url: Option<String>,
    /// Targets probed by the connectivity monitor
    pub probe_urls: Vec<String>,
    /// Deadline for a single reachability probe
    pub probe_timeout: Duration,
    /// Deadline for handling one sync request
    pub sync_deadline: Duration,
    /// Lookback applied when a device reports no usable watermark
    pub sync_lookback: Duration,
    /// How long offline changes are retained, applied or not
    pub offline_retention: Duration,
    /// How long a cached online/offline status is trusted
    pub status_ttl: Duration,
    /// How long cached resource snapshots live
    pub resource_cache_ttl: Duration,
    /// Leave a device's own events out of its deltas
    pub exclude_own_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            probe_urls: DEFAULT_PROBE_URLS.iter().map(|s| s.to_string()).collect(),
            probe_timeout: Duration::from_secs(5),
            sync_deadline: Duration::from_secs(30),
            sync_lookback: Duration::from_secs(24 * 60 * 60),
            offline_retention: Duration::from_secs(7 * 24 * 60 * 60),
            status_ttl: Duration::from_secs(60 * 60),
            resource_cache_ttl: Duration::from_secs(24 * 60 * 60),
            exclude_own_events: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let probe_urls = match env::var("PROBE_URLS") {
            Ok(raw) => parse_list(&raw),
            Err(_) => defaults.probe_urls,
        };
        if probe_urls.is_empty() {
            return Err(ConfigError::NoProbeTargets);
        }

        Ok(Self {
            host,
            port,
            database_url,
            probe_urls,
            probe_timeout: secs_var("PROBE_TIMEOUT_SECS", defaults.probe_timeout)?,
            sync_deadline: secs_var("SYNC_DEADLINE_SECS", defaults.sync_deadline)?,
            sync_lookback: scaled(
                "SYNC_LOOKBACK_HOURS",
                parse_var("SYNC_LOOKBACK_HOURS", 24u64)?,
                HOUR_SECS,
            )?,
            offline_retention: scaled(
                "OFFLINE_RETENTION_DAYS",
                parse_var("OFFLINE_RETENTION_DAYS", 7u64)?,
                DAY_SECS,
            )?,
            status_ttl: secs_var("STATUS_TTL_SECS", defaults.status_ttl)?,
            resource_cache_ttl: secs_var("RESOURCE_CACHE_TTL_SECS", defaults.resource_cache_ttl)?,
            exclude_own_events: parse_var("EXCLUDE_OWN_EVENTS", false)?,
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;

/// `count` units of `unit_secs` seconds. Lookbacks and retention windows are
/// later handled in milliseconds, so they must fit in a `u64` of those.
fn scaled(name: &'static str, count: u64, unit_secs: u64) -> Result<Duration, ConfigError> {
    count
        .checked_mul(unit_secs)
        .filter(|secs| secs.checked_mul(1000).is_some())
        .map(Duration::from_secs)
        .ok_or(ConfigError::Invalid(name))
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid value for {0}")]
    Invalid(&'static str),

    #[error("PROBE_URLS must name at least one target")]
    NoProbeTargets,
}
