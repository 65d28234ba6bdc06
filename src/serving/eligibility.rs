//! Eligibility Filter
//!
//! Computes the set of ads a publisher may be served right now: active
//! window covers `now`, remaining budget covers one play, and one more
//! play still fits under the ad's daily spend cap.

use crate::models::{Ad, Publisher};
use crate::serving::error::ServeError;
use crate::store::AdStore;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Candidate ads for one stream request.
///
/// An unknown publisher fails with `PublisherNotFound`. An empty result
/// means no ad is live at all (the caller maps it to `NoAdAvailable`);
/// live ads that are all capped for the day fail with `BudgetExceeded`,
/// so the caller can tell "nothing to show" from "come back tomorrow".
pub fn find_eligible(
    store: &AdStore,
    now: DateTime<Utc>,
    publisher_id: Uuid,
) -> Result<Vec<Ad>, ServeError> {
    let publisher = lookup_publisher(store, publisher_id)?;
    if !publisher.is_active {
        return Err(ServeError::Validation(
            "Publisher account is inactive".to_string(),
        ));
    }

    let candidates = store.find_live_ads(now).map_err(ServeError::from_store)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let played_today = store
        .plays_for_day(now.date_naive())
        .map_err(ServeError::from_store)?;

    let eligible: Vec<Ad> = candidates
        .into_iter()
        .filter(|ad| {
            let today = played_today.get(&ad.id).copied().unwrap_or(0);
            fits_daily_budget(ad, today)
        })
        .collect();

    if eligible.is_empty() {
        return Err(ServeError::BudgetExceeded);
    }
    Ok(eligible)
}

pub fn lookup_publisher(store: &AdStore, publisher_id: Uuid) -> Result<Publisher, ServeError> {
    store
        .get_publisher(publisher_id)
        .map_err(ServeError::from_store)?
        .ok_or(ServeError::PublisherNotFound)
}

/// Whether one more play fits under the daily spend cap. `per_day_budget`
/// is a spend cap: the next play's cost, added to today's spend, must not
/// exceed it.
fn fits_daily_budget(ad: &Ad, plays_today: i64) -> bool {
    plays_today < ad.daily_play_limit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_ad(per_play: i64, per_day_budget: i64) -> Ad {
        let now = Utc::now();
        Ad {
            id: Uuid::new_v4(),
            category: "gaming".to_string(),
            src: "https://cdn.test/ad.mp4".to_string(),
            advertiser_id: Uuid::new_v4(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            amount_cents: 30_000,
            remaining_cents: 30_000,
            per_play_cents: per_play,
            per_day_budget_cents: per_day_budget,
            play_count: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_daily_budget_admits_until_spend_cap() {
        let ad = make_ad(50, 1000); // 20 plays per day

        assert!(fits_daily_budget(&ad, 0));
        assert!(fits_daily_budget(&ad, 19));
        assert!(!fits_daily_budget(&ad, 20));
        assert!(!fits_daily_budget(&ad, 100));
    }

    #[test]
    fn test_daily_budget_never_overspends_on_uneven_split() {
        // 10 budget / 3 per play: only 3 plays fit (9 spent); a 4th would
        // push spend to 12.
        let ad = make_ad(3, 10);

        assert!(fits_daily_budget(&ad, 2));
        assert!(!fits_daily_budget(&ad, 3));
    }

    #[test]
    fn test_daily_play_limit_matches_budget_rule() {
        let ad = make_ad(50, 1000);
        assert_eq!(ad.daily_play_limit(), 20);
        assert!(fits_daily_budget(&ad, ad.daily_play_limit() - 1));
        assert!(!fits_daily_budget(&ad, ad.daily_play_limit()));
    }
}
