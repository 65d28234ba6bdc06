//! Ad Serving Core
//!
//! The budget/play accounting path invoked on every stream request:
//!
//! ```text
//! stream request
//!       │
//!       ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Eligibility  │────▶│  Selection   │────▶│  Settlement  │
//! │ (window +    │     │ (uniform     │     │ (guarded     │
//! │  budget +    │     │  random,     │     │  debit +     │
//! │  daily cap)  │     │  injected    │     │  play record │
//! └──────────────┘     │  RNG)        │     │  + credit)   │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! Eligibility and selection work on snapshots and may race other
//! requests freely; nothing they observe is written back. Settlement's
//! guarded debit re-checks every condition at commit time, so each
//! committed play is counted exactly once regardless of interleaving.

pub mod eligibility;
pub mod error;
pub mod selection;
pub mod settlement;
pub mod sweep;

#[cfg(test)]
mod settlement_tests;

pub use error::ServeError;
pub use settlement::{settle_play, Settlement};

use crate::store::AdStore;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// One full serving pass: eligibility, selection, settlement.
pub fn serve_play<R: Rng>(
    store: &AdStore,
    publisher_id: Uuid,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Settlement, ServeError> {
    let candidates = eligibility::find_eligible(store, now, publisher_id)?;
    let ad = selection::select_ad(&candidates, rng).ok_or(ServeError::NoAdAvailable)?;
    settlement::settle_play(store, ad.id, publisher_id, now)
}
