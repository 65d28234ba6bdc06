use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A video ad with a budget and an active date window.
///
/// All money fields are integer cents. `remaining_cents` only ever moves
/// down, one `per_play_cents` step per settled play, so
/// `remaining_cents = amount_cents - per_play_cents * play_count` at all
/// times.
#[derive(Debug, Clone, Serialize)]
pub struct Ad {
    pub id: Uuid,
    pub category: String,
    pub src: String,
    pub advertiser_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount_cents: i64,
    pub remaining_cents: i64,
    pub per_play_cents: i64,
    pub per_day_budget_cents: i64,
    pub play_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Ad {
    /// Maximum plays per calendar day under the daily spend cap.
    pub fn daily_play_limit(&self) -> i64 {
        self.per_day_budget_cents / self.per_play_cents
    }

    /// Whether the ad's active window covers `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

/// A publisher account. Earnings accumulate with every settled play.
#[derive(Debug, Clone, Serialize)]
pub struct Publisher {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub category: String,
    pub monthly_earnings_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An advertiser account. Owns zero or more ads.
#[derive(Debug, Clone, Serialize)]
pub struct Advertiser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub company: String,
    pub created_at: DateTime<Utc>,
}

/// Per-publisher play counter for one ad on one calendar day.
///
/// The day comes from an explicit timestamp recorded at settlement time,
/// never from row insertion order.
#[derive(Debug, Clone)]
pub struct PublisherPlay {
    pub ad_id: Uuid,
    pub publisher_id: Uuid,
    pub play_day: NaiveDate,
    pub daily_played: i64,
    pub first_played_at: DateTime<Utc>,
}

/// Frozen snapshot of an ad at the moment it expired. Immutable; never
/// participates in eligibility or selection.
#[derive(Debug, Clone)]
pub struct ArchivedAd {
    pub id: Uuid,
    pub category: String,
    pub src: String,
    pub advertiser_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount_cents: i64,
    pub remaining_cents: i64,
    pub per_play_cents: i64,
    pub per_day_budget_cents: i64,
    pub play_count: i64,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

/// The publisher-credit leg of one play.
///
/// `play_id` is the dedupe key: a credit left unsettled by a crash is
/// re-applied later with the same recorded amount, never twice.
#[derive(Debug, Clone)]
pub struct EarningsCredit {
    pub play_id: Uuid,
    pub ad_id: Uuid,
    pub publisher_id: Uuid,
    pub amount_cents: i64,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    pub archive_sweep_secs: u64,
    pub daily_reset_secs: u64,
    pub daily_reset_offset_secs: u64,
    pub credit_flush_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./admarket.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .unwrap_or(3001);

        let jwt_secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let archive_sweep_secs = std::env::var("ARCHIVE_SWEEP_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86_400);

        let daily_reset_secs = std::env::var("DAILY_RESET_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86_400);

        // Keeps the reset tick away from the archival tick so the two jobs
        // never fire back-to-back at midnight.
        let daily_reset_offset_secs = std::env::var("DAILY_RESET_OFFSET_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3_600);

        let credit_flush_secs = std::env::var("CREDIT_FLUSH_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        Ok(Self {
            database_path,
            port,
            jwt_secret,
            archive_sweep_secs,
            daily_reset_secs,
            daily_reset_offset_secs,
            credit_flush_secs,
        })
    }
}
