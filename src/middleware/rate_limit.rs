//! Rate limiting for the public stream endpoint.
//!
//! Fixed window per client IP. The stream endpoint is unauthenticated,
//! so this is the only throttle between a misbehaving player loop and
//! the settlement path.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

// Entries older than two windows get pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    hits: Arc<Mutex<HashMap<IpAddr, WindowCount>>>,
}

struct WindowCount {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_env() -> Self {
        let max_per_window = std::env::var("STREAM_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(120);
        Self::new(max_per_window, Duration::from_secs(60))
    }

    /// Count one request; Err carries the time until the window resets.
    fn try_acquire(&self, ip: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self.hits.lock();

        if hits.len() > PRUNE_THRESHOLD {
            let window = self.window;
            hits.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
        }

        let entry = hits.entry(ip).or_insert(WindowCount {
            window_start: now,
            count: 0,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        if entry.count > self.max_per_window {
            let reset_at = entry.window_start + self.window;
            Err(reset_at.saturating_duration_since(now))
        } else {
            Ok(())
        }
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    match limiter.try_acquire(ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(
                ip = %ip,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "error": "rate_limit_exceeded",
                "retry_after_seconds": retry_after.as_secs(),
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..10 {
            assert!(limiter.try_acquire(ip).is_ok());
        }
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.try_acquire(ip).is_ok());
        }
        assert!(limiter.try_acquire(ip).is_err());
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let limiter = RateLimiter::new(2, Duration::from_millis(20));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.try_acquire(ip).is_ok());
        assert!(limiter.try_acquire(ip).is_ok());
        assert!(limiter.try_acquire(ip).is_err());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire(ip).is_ok());
    }

    #[test]
    fn test_limits_are_per_ip() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.try_acquire(first).is_ok());
        assert!(limiter.try_acquire(first).is_err());
        assert!(limiter.try_acquire(second).is_ok());
    }
}
