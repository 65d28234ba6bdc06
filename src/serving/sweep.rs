//! Archival Sweep & Daily Reset
//!
//! Two scheduled jobs over the live ad collection:
//!
//! - `archive_expired` moves ads past their end date into the archive
//!   table, record by record, snapshot-then-delete in one transaction per
//!   ad. Settlement racing the sweep fails its commit-time guard and
//!   surfaces `AdNotFound`; it can never mutate an archive snapshot.
//! - `reset_daily_counters` zeroes every per-day play counter. Lifetime
//!   totals are untouched.

use crate::store::AdStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Move every expired ad into the archive. Returns how many ads moved.
/// Safe to re-run: an already-archived ad is skipped, never duplicated.
pub fn archive_expired(store: &AdStore, now: DateTime<Utc>) -> Result<usize> {
    let expired = store.list_expired_ad_ids(now)?;
    if expired.is_empty() {
        return Ok(0);
    }

    let mut moved = 0;
    for ad_id in expired {
        if store.archive_ad(ad_id, now)? {
            debug!(%ad_id, "ad archived");
            moved += 1;
        }
    }

    if moved > 0 {
        info!("🧹 Archival sweep moved {} expired ads", moved);
    }
    Ok(moved)
}

/// Zero all daily play counters. Returns how many rows were touched.
pub fn reset_daily_counters(store: &AdStore) -> Result<usize> {
    let rows = store.reset_daily_counters()?;
    if rows > 0 {
        info!("🔄 Daily reset cleared {} play counters", rows);
    }
    Ok(rows)
}
