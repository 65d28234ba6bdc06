//! Ad API Endpoints
//!
//! Ad creation (advertiser-only) and the public stream endpoint that
//! drives the serving core.

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::auth::api::require_role;
use crate::auth::models::{Claims, Role};
use crate::models::{Ad, Publisher};
use crate::serving;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Ad creation request. Fields are optional so missing input reports a
/// precise validation message instead of a generic deserialization error.
#[derive(Debug, Deserialize)]
pub struct CreateAdRequest {
    pub category: Option<String>,
    pub src: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub per_day_budget_cents: Option<i64>,
    pub per_play_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub ad: Ad,
    pub publisher: Publisher,
    pub play_id: String,
    pub credited_cents: i64,
}

/// POST /api/ads
pub async fn create_ad(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAdRequest>,
) -> Result<(StatusCode, Json<Ad>), ApiError> {
    let advertiser_id = require_role(&claims, Role::Advertiser)?;

    let category = non_empty(payload.category, "Category is required")?;
    let src = non_empty(payload.src, "Video source URL is required")?;
    let start_date = payload
        .start_date
        .ok_or_else(|| ApiError::Validation("Start date is required".to_string()))?;
    let end_date = payload
        .end_date
        .ok_or_else(|| ApiError::Validation("End date is required".to_string()))?;
    let per_day_budget_cents = payload
        .per_day_budget_cents
        .ok_or_else(|| ApiError::Validation("Per-day budget is required".to_string()))?;
    let per_play_cents = payload
        .per_play_cents
        .ok_or_else(|| ApiError::Validation("Per-play amount is required".to_string()))?;

    if per_play_cents <= 0 {
        return Err(ApiError::Validation(
            "Per-play amount must be positive".to_string(),
        ));
    }
    if per_day_budget_cents < per_play_cents {
        return Err(ApiError::Validation(
            "Per-day budget must cover at least one play".to_string(),
        ));
    }
    let days = (end_date - start_date).num_days();
    if days < 1 {
        return Err(ApiError::Validation(
            "Active window must cover at least one full day".to_string(),
        ));
    }

    // Total budget: the daily spend cap times the number of active days.
    let amount_cents = per_day_budget_cents * days;

    let ad = Ad {
        id: Uuid::new_v4(),
        category: category.to_lowercase(),
        src,
        advertiser_id,
        start_date,
        end_date,
        amount_cents,
        remaining_cents: amount_cents,
        per_play_cents,
        per_day_budget_cents,
        play_count: 0,
        created_at: Utc::now(),
    };
    state.store.insert_ad(&ad)?;

    info!(
        ad_id = %ad.id,
        advertiser = %advertiser_id,
        amount_cents,
        "📼 Ad created"
    );

    Ok((StatusCode::CREATED, Json(ad)))
}

/// GET /api/ads/stream/:publisher_id
///
/// One full serving pass: eligibility, uniform random selection, and
/// settlement of the chosen play.
pub async fn stream_ad(
    State(state): State<AppState>,
    Path(publisher_id): Path<Uuid>,
) -> Result<Json<StreamResponse>, ApiError> {
    let now = Utc::now();
    let mut rng = rand::thread_rng();

    let settlement = serving::serve_play(&state.store, publisher_id, now, &mut rng)?;

    info!(
        ad_id = %settlement.ad.id,
        publisher = %publisher_id,
        credited_cents = settlement.credited_cents,
        "▶️  Play settled"
    );

    Ok(Json(StreamResponse {
        play_id: settlement.play_id.to_string(),
        credited_cents: settlement.credited_cents,
        ad: settlement.ad,
        publisher: settlement.publisher,
    }))
}

fn non_empty(value: Option<String>, message: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::Validation(message.to_string())),
    }
}
