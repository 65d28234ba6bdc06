//! Selection Policy
//!
//! Uniform random choice among eligible candidates. The RNG is injected
//! so selection is a pure function of (candidates, rng); production uses
//! the thread RNG, tests a seeded ChaCha8.
//!
//! No weighting or pacing - uniformity keeps selection stateless.

use crate::models::Ad;
use rand::seq::SliceRandom;
use rand::Rng;

pub fn select_ad<'a, R: Rng>(candidates: &'a [Ad], rng: &mut R) -> Option<&'a Ad> {
    candidates.choose(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn make_candidates(n: usize) -> Vec<Ad> {
        let now = Utc::now();
        (0..n)
            .map(|_| Ad {
                id: Uuid::new_v4(),
                category: "gaming".to_string(),
                src: "https://cdn.test/ad.mp4".to_string(),
                advertiser_id: Uuid::new_v4(),
                start_date: now - Duration::days(1),
                end_date: now + Duration::days(30),
                amount_cents: 30_000,
                remaining_cents: 30_000,
                per_play_cents: 50,
                per_day_budget_cents: 1000,
                play_count: 0,
                created_at: now,
            })
            .collect()
    }

    #[test]
    fn test_empty_candidates_select_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(select_ad(&[], &mut rng).is_none());
    }

    #[test]
    fn test_single_candidate_always_selected() {
        let candidates = make_candidates(1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(select_ad(&candidates, &mut rng).unwrap().id, candidates[0].id);
        }
    }

    #[test]
    fn test_same_seed_same_choices() {
        let candidates = make_candidates(5);

        let mut rng_a = ChaCha8Rng::seed_from_u64(42);
        let mut rng_b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(
                select_ad(&candidates, &mut rng_a).unwrap().id,
                select_ad(&candidates, &mut rng_b).unwrap().id
            );
        }
    }

    #[test]
    fn test_selection_covers_all_candidates() {
        let candidates = make_candidates(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for _ in 0..400 {
            let picked = select_ad(&candidates, &mut rng).unwrap();
            *counts.entry(picked.id).or_default() += 1;
        }

        // Every candidate shows up; no candidate dominates wildly.
        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            assert!(*count > 40, "uniform choice should not starve a candidate");
        }
    }
}
