//! Settlement Tests
//!
//! Concurrency and race behavior of the settlement path: exactly-once
//! budget accounting under simultaneous requests, daily cap enforcement,
//! and the sweep/settlement race.

use crate::models::{Ad, Advertiser, Publisher};
use crate::serving::settlement::settle_play;
use crate::serving::{sweep, ServeError};
use crate::store::AdStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tempfile::NamedTempFile;
use uuid::Uuid;

fn create_test_store() -> (Arc<AdStore>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let store = AdStore::new(temp_file.path().to_str().unwrap()).unwrap();
    (Arc::new(store), temp_file)
}

fn seed_advertiser(store: &AdStore) -> Advertiser {
    let advertiser = Advertiser {
        id: Uuid::new_v4(),
        name: "Acme".to_string(),
        email: format!("{}@acme.test", Uuid::new_v4().simple()),
        password_hash: "hash".to_string(),
        company: "Acme Inc".to_string(),
        created_at: Utc::now(),
    };
    store.insert_advertiser(&advertiser).unwrap();
    advertiser
}

fn seed_publisher(store: &AdStore) -> Publisher {
    let publisher = Publisher {
        id: Uuid::new_v4(),
        name: "Streamer".to_string(),
        email: format!("{}@pub.test", Uuid::new_v4().simple()),
        password_hash: "hash".to_string(),
        category: "gaming".to_string(),
        monthly_earnings_cents: 0,
        is_active: true,
        created_at: Utc::now(),
    };
    store.insert_publisher(&publisher).unwrap();
    publisher
}

/// Ad with lifetime budget for `lifetime_plays` and daily budget for
/// `daily_plays`, at 50 cents per play.
fn seed_ad(
    store: &AdStore,
    advertiser_id: Uuid,
    now: DateTime<Utc>,
    lifetime_plays: i64,
    daily_plays: i64,
) -> Ad {
    let per_play = 50;
    let ad = Ad {
        id: Uuid::new_v4(),
        category: "gaming".to_string(),
        src: "https://cdn.test/ad.mp4".to_string(),
        advertiser_id,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(30),
        amount_cents: per_play * lifetime_plays,
        remaining_cents: per_play * lifetime_plays,
        per_play_cents: per_play,
        per_day_budget_cents: per_play * daily_plays,
        play_count: 0,
        created_at: now,
    };
    store.insert_ad(&ad).unwrap();
    ad
}

#[test]
fn test_settled_play_updates_all_counters() {
    let (store, _temp) = create_test_store();
    let advertiser = seed_advertiser(&store);
    let publisher = seed_publisher(&store);
    let now = Utc::now();
    let ad = seed_ad(&store, advertiser.id, now, 10, 10);

    let settlement = settle_play(&store, ad.id, publisher.id, now).unwrap();

    assert_eq!(settlement.credited_cents, 50);
    assert_eq!(settlement.ad.play_count, 1);
    assert_eq!(settlement.ad.remaining_cents, ad.amount_cents - 50);
    assert_eq!(settlement.publisher.monthly_earnings_cents, 50);

    let play = store
        .get_play(ad.id, publisher.id, now.date_naive())
        .unwrap()
        .unwrap();
    assert_eq!(play.daily_played, 1);
    assert!(store.pending_credits().unwrap().is_empty());
}

#[test]
fn test_unknown_ad_fails_not_found() {
    let (store, _temp) = create_test_store();
    let publisher = seed_publisher(&store);

    let result = settle_play(&store, Uuid::new_v4(), publisher.id, Utc::now());
    assert!(matches!(result, Err(ServeError::AdNotFound)));
}

#[test]
fn test_concurrent_settlement_exactly_k_successes() {
    let (store, _temp) = create_test_store();
    let advertiser = seed_advertiser(&store);
    let publisher = seed_publisher(&store);
    let now = Utc::now();

    // Budget for exactly 5 plays; 20 simultaneous requests.
    let ad = seed_ad(&store, advertiser.id, now, 5, 100);

    let mut successes = 0;
    let mut rejections = 0;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                let ad_id = ad.id;
                let publisher_id = publisher.id;
                scope.spawn(move || settle_play(&store, ad_id, publisher_id, now))
            })
            .collect();

        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => successes += 1,
                Err(ServeError::BudgetExceeded) => rejections += 1,
                Err(other) => panic!("unexpected settlement error: {}", other),
            }
        }
    });

    assert_eq!(successes, 5, "exactly the budgeted plays must commit");
    assert_eq!(rejections, 15);

    let loaded = store.get_ad(ad.id).unwrap().unwrap();
    assert_eq!(loaded.play_count, 5);
    assert_eq!(loaded.remaining_cents, 0);

    // Every committed play paid the publisher exactly once.
    let earned = store
        .get_publisher(publisher.id)
        .unwrap()
        .unwrap()
        .monthly_earnings_cents;
    assert_eq!(earned, 5 * 50);
}

#[test]
fn test_concurrent_settlement_across_publishers() {
    let (store, _temp) = create_test_store();
    let advertiser = seed_advertiser(&store);
    let now = Utc::now();
    let publishers: Vec<_> = (0..4).map(|_| seed_publisher(&store)).collect();

    // Daily cap of 8 plays shared across 4 publishers issuing 4 requests each.
    let ad = seed_ad(&store, advertiser.id, now, 100, 8);

    let mut successes = 0;
    std::thread::scope(|scope| {
        let handles: Vec<_> = publishers
            .iter()
            .flat_map(|publisher| {
                (0..4).map(|_| {
                    let store = Arc::clone(&store);
                    let ad_id = ad.id;
                    let publisher_id = publisher.id;
                    scope.spawn(move || settle_play(&store, ad_id, publisher_id, now))
                })
            })
            .collect();

        for handle in handles {
            if handle.join().unwrap().is_ok() {
                successes += 1;
            }
        }
    });

    assert_eq!(successes, 8, "the daily cap is global across publishers");

    let loaded = store.get_ad(ad.id).unwrap().unwrap();
    assert_eq!(loaded.play_count, 8);

    let total_daily: i64 = publishers
        .iter()
        .filter_map(|p| store.get_play(ad.id, p.id, now.date_naive()).unwrap())
        .map(|play| play.daily_played)
        .sum();
    assert_eq!(total_daily, 8);
}

#[test]
fn test_daily_cap_blocks_then_reset_reopens() {
    let (store, _temp) = create_test_store();
    let advertiser = seed_advertiser(&store);
    let publisher = seed_publisher(&store);
    let now = Utc::now();
    let ad = seed_ad(&store, advertiser.id, now, 100, 3);

    for _ in 0..3 {
        settle_play(&store, ad.id, publisher.id, now).unwrap();
    }
    let blocked = settle_play(&store, ad.id, publisher.id, now);
    assert!(matches!(blocked, Err(ServeError::BudgetExceeded)));

    sweep::reset_daily_counters(&store).unwrap();

    // Cap reopened; lifetime totals carried over.
    settle_play(&store, ad.id, publisher.id, now).unwrap();
    let loaded = store.get_ad(ad.id).unwrap().unwrap();
    assert_eq!(loaded.play_count, 4);
}

#[test]
fn test_settlement_racing_archival_fails_clean() {
    let (store, _temp) = create_test_store();
    let advertiser = seed_advertiser(&store);
    let publisher = seed_publisher(&store);
    let now = Utc::now();
    let ad = seed_ad(&store, advertiser.id, now, 10, 10);

    // Two plays, then the ad expires and the sweep takes it.
    settle_play(&store, ad.id, publisher.id, now).unwrap();
    settle_play(&store, ad.id, publisher.id, now).unwrap();

    let later = ad.end_date + Duration::hours(1);
    assert_eq!(sweep::archive_expired(&store, later).unwrap(), 1);

    // A request that selected the ad before the sweep must fail, not
    // resurrect or corrupt anything.
    let result = settle_play(&store, ad.id, publisher.id, now);
    assert!(matches!(result, Err(ServeError::AdNotFound)));

    let snapshot = store.get_archived_ad(ad.id).unwrap().unwrap();
    assert_eq!(snapshot.play_count, 2);
    assert_eq!(snapshot.remaining_cents, ad.amount_cents - 2 * 50);
}
