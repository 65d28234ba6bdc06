//! AdMarket - Video Ad Serving Marketplace
//!
//! Connects advertisers (who upload video ads with budgets) to
//! publishers (who stream ads and earn per play). Every stream request
//! runs eligibility, uniform random selection, and atomic play
//! settlement against the SQLite ledger; scheduled jobs archive expired
//! ads and reset daily play counters.

use anyhow::{Context, Result};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    net::TcpListener,
    time::{interval_at, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use admarket_backend::{
    api::{create_router, AppState},
    auth::JwtHandler,
    middleware::RateLimiter,
    models::Config,
    serving::settlement::flush_pending_credits,
    serving::sweep,
    store::AdStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 AdMarket server starting");

    let config = Config::from_env()?;

    let store = Arc::new(AdStore::new(&config.database_path)?);
    info!("💾 Live ads in ledger: {}", store.ads_count());

    // Recover earnings credits left pending by an unclean shutdown.
    let recovered = flush_pending_credits(&store)?;
    if recovered > 0 {
        info!("💰 Recovered {} pending earnings credits", recovered);
    }

    let jwt = Arc::new(JwtHandler::new(config.jwt_secret.clone()));

    tokio::spawn(scheduled_jobs(store.clone(), config.clone()));
    tokio::spawn(credit_flush_polling(
        store.clone(),
        config.credit_flush_secs,
    ));

    let state = AppState {
        store,
        jwt,
    };
    let rate_limiter = RateLimiter::from_env();
    let app = create_router(state, rate_limiter);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filtered output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "admarket_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Archival sweep and daily counter reset.
///
/// Both jobs tick from one task so they can never overlap each other;
/// the reset runs at a fixed offset from the sweep.
async fn scheduled_jobs(store: Arc<AdStore>, config: Config) {
    let sweep_period = Duration::from_secs(config.archive_sweep_secs);
    let reset_period = Duration::from_secs(config.daily_reset_secs);
    let reset_offset = Duration::from_secs(config.daily_reset_offset_secs);

    let mut sweep_ticker = interval_at(Instant::now() + sweep_period, sweep_period);
    let mut reset_ticker = interval_at(Instant::now() + reset_offset, reset_period);

    info!(
        "🗓️  Scheduled jobs armed: sweep every {}s, reset every {}s (offset {}s)",
        config.archive_sweep_secs, config.daily_reset_secs, config.daily_reset_offset_secs
    );

    loop {
        tokio::select! {
            _ = sweep_ticker.tick() => {
                if let Err(e) = sweep::archive_expired(&store, Utc::now()) {
                    warn!("Archival sweep failed: {}", e);
                }
            }
            _ = reset_ticker.tick() => {
                if let Err(e) = sweep::reset_daily_counters(&store) {
                    warn!("Daily reset failed: {}", e);
                }
            }
        }
    }
}

/// Re-drive earnings credits that a settlement left pending.
async fn credit_flush_polling(store: Arc<AdStore>, poll_secs: u64) {
    let period = Duration::from_secs(poll_secs.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;
        match flush_pending_credits(&store) {
            Ok(applied) if applied > 0 => {
                info!("💰 Re-applied {} pending earnings credits", applied);
            }
            Ok(_) => {}
            Err(e) => warn!("Credit flush failed: {}", e),
        }
    }
}
