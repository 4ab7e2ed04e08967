//! Time-bucket keys for usage counters.
//!
//! Keys are pure functions of UTC wall-clock time: every process computing a
//! key for the same instant gets the same string, so counters shard cleanly
//! by hour and by day without coordination.

use chrono::{DateTime, Utc};

/// Hour bucket, e.g. `"2026080513"` for 2026-08-05 13:xx UTC.
pub fn hour_key(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H").to_string()
}

/// Day bucket, e.g. `"20260805"`.
pub fn date_key(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}
