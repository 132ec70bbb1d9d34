//! Lower bound of a delta query.
//!
//! Devices report their last sync time in unix seconds. Anything missing or
//! nonsensical degrades to a fixed lookback window instead of failing.

use crate::Timestamp;

/// Default lookback when a device reports no usable watermark: 24 hours.
pub const DEFAULT_LOOKBACK_MS: Timestamp = 24 * 60 * 60 * 1000;

/// Resolve a reported watermark (unix seconds) to an exclusive lower bound in
/// milliseconds.
///
/// Absent or negative values yield `now - lookback`.
pub fn resolve_since(last_sync_secs: Option<i64>, now: Timestamp, lookback: Timestamp) -> Timestamp {
    match last_sync_secs {
        Some(secs) if secs >= 0 => (secs as u64).saturating_mul(1000),
        _ => now.saturating_sub(lookback),
    }
}
