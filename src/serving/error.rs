//! Serving error taxonomy.
//!
//! Every failure in the serving core is a pure function of input state;
//! no error leaves a play partially applied.

use std::fmt;

#[derive(Debug)]
pub enum ServeError {
    /// Missing or malformed input. Reported to the caller, non-retryable.
    Validation(String),
    /// The publisher id does not resolve to an account.
    PublisherNotFound,
    /// The ad is no longer live (archived or deleted mid-request).
    AdNotFound,
    /// No ad currently passes eligibility for this publisher.
    NoAdAvailable,
    /// The commit-time re-check declined the play (lifetime budget or
    /// daily cap). Non-retryable for this request.
    BudgetExceeded,
    /// An atomic update lost the race; retried internally a bounded
    /// number of times before surfacing.
    Conflict,
    /// Transient store failure.
    Store(anyhow::Error),
}

impl ServeError {
    /// Map a store error, pulling SQLITE_BUSY/locked out as a retryable
    /// conflict.
    pub fn from_store(err: anyhow::Error) -> Self {
        if let Some(rusqlite::Error::SqliteFailure(code, _)) =
            err.downcast_ref::<rusqlite::Error>()
        {
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return ServeError::Conflict;
            }
        }
        ServeError::Store(err)
    }
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeError::Validation(msg) => write!(f, "{}", msg),
            ServeError::PublisherNotFound => write!(f, "Publisher not found"),
            ServeError::AdNotFound => write!(f, "Ad no longer available"),
            ServeError::NoAdAvailable => write!(f, "No ad available for streaming"),
            ServeError::BudgetExceeded => write!(f, "Daily or total budget limit exceeded"),
            ServeError::Conflict => write!(f, "Concurrent update conflict"),
            ServeError::Store(err) => write!(f, "Store unavailable: {}", err),
        }
    }
}

impl std::error::Error for ServeError {}
