//! Ledger Store
//!
//! Durable SQLite storage for ads, publishers, advertisers, archived ads,
//! per-publisher play records, and earnings credits.
//!
//! Every mutation to a shared counter goes through a guarded conditional
//! UPDATE; the rows-affected count is the commit/reject signal. Nothing in
//! the serving path reads a value and writes it back unconditionally.

use crate::models::{Ad, Advertiser, ArchivedAd, EarningsCredit, Publisher, PublisherPlay};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
-- WAL for concurrent reads during writes
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS advertisers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    company TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS publishers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    category TEXT NOT NULL,
    monthly_earnings_cents INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ads (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    src TEXT NOT NULL,
    advertiser_id TEXT NOT NULL REFERENCES advertisers(id),
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    remaining_cents INTEGER NOT NULL,
    per_play_cents INTEGER NOT NULL,
    per_day_budget_cents INTEGER NOT NULL,
    play_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    CHECK (remaining_cents >= 0),
    CHECK (per_play_cents > 0)
);

CREATE INDEX IF NOT EXISTS idx_ads_window ON ads(start_date, end_date);
CREATE INDEX IF NOT EXISTS idx_ads_advertiser ON ads(advertiser_id);

-- One row per (ad, publisher, calendar day). play_day comes from an
-- explicit timestamp recorded at settlement time.
CREATE TABLE IF NOT EXISTS publisher_plays (
    ad_id TEXT NOT NULL,
    publisher_id TEXT NOT NULL REFERENCES publishers(id),
    play_day TEXT NOT NULL,
    daily_played INTEGER NOT NULL DEFAULT 0,
    first_played_at TEXT NOT NULL,
    PRIMARY KEY (ad_id, publisher_id, play_day)
);

CREATE INDEX IF NOT EXISTS idx_publisher_plays_ad_day
    ON publisher_plays(ad_id, play_day);

CREATE TABLE IF NOT EXISTS archived_ads (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    src TEXT NOT NULL,
    advertiser_id TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    remaining_cents INTEGER NOT NULL,
    per_play_cents INTEGER NOT NULL,
    per_day_budget_cents INTEGER NOT NULL,
    play_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    archived_at TEXT NOT NULL
);

-- Publisher-credit leg of each play. play_id is the dedupe key.
CREATE TABLE IF NOT EXISTS earnings_credits (
    play_id TEXT PRIMARY KEY,
    ad_id TEXT NOT NULL,
    publisher_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    settled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_earnings_credits_pending
    ON earnings_credits(settled) WHERE settled = 0;
"#;

/// Timestamps are stored as fixed-width RFC 3339 UTC ("...Z") so string
/// comparison in SQL orders the same way the instants do.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn day_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_ad(row: &Row<'_>) -> rusqlite::Result<Ad> {
    Ok(Ad {
        id: uuid_col(row, 0)?,
        category: row.get(1)?,
        src: row.get(2)?,
        advertiser_id: uuid_col(row, 3)?,
        start_date: ts_col(row, 4)?,
        end_date: ts_col(row, 5)?,
        amount_cents: row.get(6)?,
        remaining_cents: row.get(7)?,
        per_play_cents: row.get(8)?,
        per_day_budget_cents: row.get(9)?,
        play_count: row.get(10)?,
        created_at: ts_col(row, 11)?,
    })
}

const AD_COLUMNS: &str = "id, category, src, advertiser_id, start_date, end_date, \
     amount_cents, remaining_cents, per_play_cents, per_day_budget_cents, play_count, created_at";

fn row_to_publisher(row: &Row<'_>) -> rusqlite::Result<Publisher> {
    Ok(Publisher {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        category: row.get(4)?,
        monthly_earnings_cents: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: ts_col(row, 7)?,
    })
}

const PUBLISHER_COLUMNS: &str =
    "id, name, email, password_hash, category, monthly_earnings_cents, is_active, created_at";

fn row_to_advertiser(row: &Row<'_>) -> rusqlite::Result<Advertiser> {
    Ok(Advertiser {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        company: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

const ADVERTISER_COLUMNS: &str = "id, name, email, password_hash, company, created_at";

/// SQLite-backed ledger store
pub struct AdStore {
    conn: Arc<Mutex<Connection>>,
}

impl AdStore {
    /// Open (or create) the ledger database and apply the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Ledger database initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ===== Advertisers =====

    pub fn insert_advertiser(&self, advertiser: &Advertiser) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO advertisers (id, name, email, password_hash, company, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                advertiser.id.to_string(),
                advertiser.name,
                advertiser.email,
                advertiser.password_hash,
                advertiser.company,
                ts(advertiser.created_at),
            ],
        )
        .context("Failed to insert advertiser")?;
        Ok(())
    }

    pub fn get_advertiser(&self, id: Uuid) -> Result<Option<Advertiser>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ADVERTISER_COLUMNS} FROM advertisers WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], row_to_advertiser)
            .optional()
            .context("Failed to query advertiser")
    }

    pub fn find_advertiser_by_email(&self, email: &str) -> Result<Option<Advertiser>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ADVERTISER_COLUMNS} FROM advertisers WHERE email = ?1");
        conn.query_row(&sql, params![email], row_to_advertiser)
            .optional()
            .context("Failed to query advertiser by email")
    }

    // ===== Publishers =====

    pub fn insert_publisher(&self, publisher: &Publisher) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO publishers
                 (id, name, email, password_hash, category, monthly_earnings_cents, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                publisher.id.to_string(),
                publisher.name,
                publisher.email,
                publisher.password_hash,
                publisher.category,
                publisher.monthly_earnings_cents,
                publisher.is_active as i64,
                ts(publisher.created_at),
            ],
        )
        .context("Failed to insert publisher")?;
        Ok(())
    }

    pub fn get_publisher(&self, id: Uuid) -> Result<Option<Publisher>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {PUBLISHER_COLUMNS} FROM publishers WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], row_to_publisher)
            .optional()
            .context("Failed to query publisher")
    }

    pub fn find_publisher_by_email(&self, email: &str) -> Result<Option<Publisher>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {PUBLISHER_COLUMNS} FROM publishers WHERE email = ?1");
        conn.query_row(&sql, params![email], row_to_publisher)
            .optional()
            .context("Failed to query publisher by email")
    }

    // ===== Ads =====

    pub fn insert_ad(&self, ad: &Ad) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ads
                 (id, category, src, advertiser_id, start_date, end_date, amount_cents,
                  remaining_cents, per_play_cents, per_day_budget_cents, play_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                ad.id.to_string(),
                ad.category,
                ad.src,
                ad.advertiser_id.to_string(),
                ts(ad.start_date),
                ts(ad.end_date),
                ad.amount_cents,
                ad.remaining_cents,
                ad.per_play_cents,
                ad.per_day_budget_cents,
                ad.play_count,
                ts(ad.created_at),
            ],
        )
        .context("Failed to insert ad")?;
        Ok(())
    }

    pub fn get_ad(&self, id: Uuid) -> Result<Option<Ad>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], row_to_ad)
            .optional()
            .context("Failed to query ad")
    }

    pub fn list_ads_by_advertiser(&self, advertiser_id: Uuid) -> Result<Vec<Ad>> {
        let conn = self.conn.lock();
        let sql =
            format!("SELECT {AD_COLUMNS} FROM ads WHERE advertiser_id = ?1 ORDER BY created_at");
        let mut stmt = conn.prepare(&sql)?;
        let ads = stmt
            .query_map(params![advertiser_id.to_string()], row_to_ad)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list ads by advertiser")?;
        Ok(ads)
    }

    pub fn ads_count(&self) -> i64 {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM ads", [], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Ads whose active window covers `now` and whose remaining budget
    /// still covers one play. The daily cap is applied by the caller.
    pub fn find_live_ads(&self, now: DateTime<Utc>) -> Result<Vec<Ad>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {AD_COLUMNS} FROM ads
             WHERE start_date <= ?1 AND end_date >= ?1
               AND remaining_cents >= per_play_cents"
        );
        let mut stmt = conn.prepare(&sql)?;
        let ads = stmt
            .query_map(params![ts(now)], row_to_ad)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to query live ads")?;
        Ok(ads)
    }

    /// Total plays per ad for one calendar day, summed across publishers.
    pub fn plays_for_day(&self, day: NaiveDate) -> Result<HashMap<Uuid, i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ad_id, SUM(daily_played) FROM publisher_plays
             WHERE play_day = ?1 GROUP BY ad_id",
        )?;
        let rows = stmt
            .query_map(params![day.to_string()], |row| {
                Ok((uuid_col(row, 0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to query plays for day")?;
        Ok(rows.into_iter().collect())
    }

    // ===== Settlement primitives =====

    /// The linearization point of a play: one transaction that re-checks
    /// every serving condition at commit time, debits the budget, bumps
    /// the play counters, records the (ad, publisher, day) play row, and
    /// inserts the pending earnings credit.
    ///
    /// The guard re-checks that the ad is still live, the remaining
    /// budget covers one play, and one more play fits under the daily
    /// spend cap. The daily-cap check and the play-record bump commit
    /// together, so two racing settlements can never both squeeze under
    /// the same cap slot.
    ///
    /// Returns the post-debit ad snapshot, or None when the guard
    /// rejects (gone, out of budget, or capped for the day) - the caller
    /// distinguishes which. A rejected play changes nothing.
    pub fn commit_play(
        &self,
        ad_id: Uuid,
        publisher_id: Uuid,
        play_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ad>> {
        let day = now.date_naive();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let rows = tx
            .execute(
                "UPDATE ads
                 SET remaining_cents = remaining_cents - per_play_cents,
                     play_count = play_count + 1
                 WHERE id = ?1
                   AND start_date <= ?2 AND end_date >= ?2
                   AND remaining_cents >= per_play_cents
                   AND per_play_cents * (1 + COALESCE(
                         (SELECT SUM(daily_played) FROM publisher_plays
                          WHERE ad_id = ads.id AND play_day = ?3), 0))
                       <= per_day_budget_cents",
                params![ad_id.to_string(), ts(now), day.to_string()],
            )
            .context("Failed to apply play debit")?;
        if rows == 0 {
            tx.commit()?;
            return Ok(None);
        }

        let sql = format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1");
        let ad = tx.query_row(&sql, params![ad_id.to_string()], row_to_ad)?;

        tx.execute(
            "INSERT INTO publisher_plays (ad_id, publisher_id, play_day, daily_played, first_played_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(ad_id, publisher_id, play_day)
             DO UPDATE SET daily_played = daily_played + 1",
            params![
                ad_id.to_string(),
                publisher_id.to_string(),
                day.to_string(),
                ts(now),
            ],
        )?;

        tx.execute(
            "INSERT INTO earnings_credits
                 (play_id, ad_id, publisher_id, amount_cents, settled, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                play_id.to_string(),
                ad_id.to_string(),
                publisher_id.to_string(),
                ad.per_play_cents,
                ts(now),
            ],
        )?;

        tx.commit().context("Failed to commit play")?;
        Ok(Some(ad))
    }

    pub fn get_play(
        &self,
        ad_id: Uuid,
        publisher_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<PublisherPlay>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT ad_id, publisher_id, play_day, daily_played, first_played_at
             FROM publisher_plays
             WHERE ad_id = ?1 AND publisher_id = ?2 AND play_day = ?3",
            params![ad_id.to_string(), publisher_id.to_string(), day.to_string()],
            |row| {
                Ok(PublisherPlay {
                    ad_id: uuid_col(row, 0)?,
                    publisher_id: uuid_col(row, 1)?,
                    play_day: day_col(row, 2)?,
                    daily_played: row.get(3)?,
                    first_played_at: ts_col(row, 4)?,
                })
            },
        )
        .optional()
        .context("Failed to query publisher play")
    }

    // ===== Earnings credits =====

    /// Apply one pending credit to the publisher's earnings.
    ///
    /// Claim and apply happen in one transaction, so a credit is paid out
    /// at most once no matter how many times this runs for the same
    /// play_id. Returns false when the credit was already settled.
    pub fn apply_credit(&self, play_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let claimed = tx.execute(
            "UPDATE earnings_credits SET settled = 1 WHERE play_id = ?1 AND settled = 0",
            params![play_id.to_string()],
        )?;
        if claimed == 0 {
            tx.commit()?;
            return Ok(false);
        }

        let (publisher_id, amount_cents): (String, i64) = tx.query_row(
            "SELECT publisher_id, amount_cents FROM earnings_credits WHERE play_id = ?1",
            params![play_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let updated = tx.execute(
            "UPDATE publishers
             SET monthly_earnings_cents = monthly_earnings_cents + ?1
             WHERE id = ?2",
            params![amount_cents, publisher_id],
        )?;
        if updated == 0 {
            // Rolls back on drop; the credit stays pending.
            bail!("publisher {} missing for credit {}", publisher_id, play_id);
        }

        tx.commit().context("Failed to commit earnings credit")?;
        Ok(true)
    }

    pub fn pending_credits(&self) -> Result<Vec<EarningsCredit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT play_id, ad_id, publisher_id, amount_cents, settled, created_at
             FROM earnings_credits WHERE settled = 0 ORDER BY created_at",
        )?;
        let credits = stmt
            .query_map([], |row| {
                Ok(EarningsCredit {
                    play_id: uuid_col(row, 0)?,
                    ad_id: uuid_col(row, 1)?,
                    publisher_id: uuid_col(row, 2)?,
                    amount_cents: row.get(3)?,
                    settled: row.get::<_, i64>(4)? != 0,
                    created_at: ts_col(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list pending credits")?;
        Ok(credits)
    }

    // ===== Archival =====

    pub fn list_expired_ad_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM ads WHERE end_date < ?1")?;
        let ids = stmt
            .query_map(params![ts(now)], |row| uuid_col(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list expired ads")?;
        Ok(ids)
    }

    /// Move one expired ad into the archive: snapshot then delete, in one
    /// transaction. The snapshot keeps the final remaining_cents and
    /// play_count. Returns true when the live row was removed.
    pub fn archive_ad(&self, ad_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        tx.execute(
            "INSERT OR IGNORE INTO archived_ads
                 (id, category, src, advertiser_id, start_date, end_date, amount_cents,
                  remaining_cents, per_play_cents, per_day_budget_cents, play_count,
                  created_at, archived_at)
             SELECT id, category, src, advertiser_id, start_date, end_date, amount_cents,
                    remaining_cents, per_play_cents, per_day_budget_cents, play_count,
                    created_at, ?2
             FROM ads WHERE id = ?1 AND end_date < ?2",
            params![ad_id.to_string(), ts(now)],
        )?;

        let deleted = tx.execute(
            "DELETE FROM ads WHERE id = ?1 AND end_date < ?2",
            params![ad_id.to_string(), ts(now)],
        )?;

        tx.commit().context("Failed to commit archival")?;
        Ok(deleted > 0)
    }

    pub fn get_archived_ad(&self, id: Uuid) -> Result<Option<ArchivedAd>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, category, src, advertiser_id, start_date, end_date, amount_cents,
                    remaining_cents, per_play_cents, per_day_budget_cents, play_count,
                    created_at, archived_at
             FROM archived_ads WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok(ArchivedAd {
                    id: uuid_col(row, 0)?,
                    category: row.get(1)?,
                    src: row.get(2)?,
                    advertiser_id: uuid_col(row, 3)?,
                    start_date: ts_col(row, 4)?,
                    end_date: ts_col(row, 5)?,
                    amount_cents: row.get(6)?,
                    remaining_cents: row.get(7)?,
                    per_play_cents: row.get(8)?,
                    per_day_budget_cents: row.get(9)?,
                    play_count: row.get(10)?,
                    created_at: ts_col(row, 11)?,
                    archived_at: ts_col(row, 12)?,
                })
            },
        )
        .optional()
        .context("Failed to query archived ad")
    }

    pub fn archived_count(&self) -> i64 {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM archived_ads", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // ===== Daily reset =====

    /// Zero every per-day play counter. Lifetime totals (play_count,
    /// remaining_cents) are untouched.
    pub fn reset_daily_counters(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE publisher_plays SET daily_played = 0 WHERE daily_played != 0",
                [],
            )
            .context("Failed to reset daily counters")?;
        Ok(rows)
    }
}
