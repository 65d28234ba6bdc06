//! Play Settlement
//!
//! Applies one play's effects: budget debit + play counters on the ad,
//! daily play record for the publisher, earnings credit to the publisher.
//!
//! One transaction carries the guarded debit, the daily play record,
//! and the pending earnings credit; its commit is the linearization
//! point of the play. Applying the credit to the publisher's balance
//! happens after it, at-least-once with dedupe on the play id, so a
//! crash or transient failure can never pay a publisher twice or not
//! at all.

use crate::models::{Ad, Publisher};
use crate::serving::error::ServeError;
use crate::store::AdStore;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bounded internal retries when an atomic update loses a race.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// The outcome of one settled play.
#[derive(Debug)]
pub struct Settlement {
    pub ad: Ad,
    pub publisher: Publisher,
    pub play_id: Uuid,
    pub credited_cents: i64,
}

/// Settle one play of `ad_id` for `publisher_id` at `now`.
///
/// Conflicts (SQLITE_BUSY and friends) are retried a bounded number of
/// times; every other error surfaces immediately.
pub fn settle_play(
    store: &AdStore,
    ad_id: Uuid,
    publisher_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Settlement, ServeError> {
    let mut attempt = 0;
    loop {
        match try_settle(store, ad_id, publisher_id, now) {
            Err(ServeError::Conflict) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                debug!(%ad_id, attempt, "settlement conflict, retrying");
                std::thread::sleep(Duration::from_millis(5 << attempt));
            }
            other => return other,
        }
    }
}

fn try_settle(
    store: &AdStore,
    ad_id: Uuid,
    publisher_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Settlement, ServeError> {
    let play_id = Uuid::new_v4();

    // Commit-time re-check, budget debit, play record, and pending
    // credit land in one transaction. Selection ran on a snapshot; only
    // this guard decides whether the play happens.
    let committed = store
        .commit_play(ad_id, publisher_id, play_id, now)
        .map_err(ServeError::from_store)?;
    let Some(ad) = committed else {
        return match store.get_ad(ad_id).map_err(ServeError::from_store)? {
            // Archived or deleted between selection and commit
            None => Err(ServeError::AdNotFound),
            Some(_) => Err(ServeError::BudgetExceeded),
        };
    };

    // The play is committed at this point. A failed credit application
    // stays pending and is re-driven by the flush job; it must not fail
    // the request.
    if let Err(err) = store.apply_credit(play_id) {
        warn!(%play_id, %publisher_id, "earnings credit deferred: {}", err);
    }

    let publisher = store
        .get_publisher(publisher_id)
        .map_err(ServeError::from_store)?
        .ok_or(ServeError::PublisherNotFound)?;

    Ok(Settlement {
        credited_cents: ad.per_play_cents,
        ad,
        publisher,
        play_id,
    })
}

/// Re-apply any earnings credits left pending by a crash or transient
/// failure. Dedupe on play_id makes this safe to run any number of
/// times, concurrently with live settlement.
pub fn flush_pending_credits(store: &AdStore) -> anyhow::Result<usize> {
    let pending = store.pending_credits()?;
    let mut applied = 0;
    for credit in pending {
        match store.apply_credit(credit.play_id) {
            Ok(true) => applied += 1,
            Ok(false) => {} // settled by a racing request
            Err(err) => warn!(play_id = %credit.play_id, "credit retry failed: {}", err),
        }
    }
    Ok(applied)
}
