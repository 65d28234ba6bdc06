//! Authentication API Endpoints
//!
//! Signup, login, and dashboards for both account roles.

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::auth::models::{
    AccountResponse, AdvertiserSignupRequest, AuthResponse, Claims, LoginRequest,
    PublisherSignupRequest, Role,
};
use crate::models::{Ad, Advertiser, Publisher};
use axum::{extract::State, http::StatusCode, Extension, Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Check the request's auth context for `role` and return the account id.
pub fn require_role(claims: &Claims, role: Role) -> Result<Uuid, ApiError> {
    if claims.role != role {
        return Err(ApiError::Forbidden(format!(
            "Requires {} role",
            role.as_str()
        )));
    }
    claims
        .account_id()
        .ok_or_else(|| ApiError::Unauthorized("Malformed token subject".to_string()))
}

fn require_field(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(message.to_string()));
    }
    Ok(())
}

/// POST /api/advertisers/signup
pub async fn advertiser_signup(
    State(state): State<AppState>,
    Json(payload): Json<AdvertiserSignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&payload.name, "Name is required")?;
    require_field(&payload.email, "Email is required")?;
    require_field(&payload.password, "Password is required")?;
    require_field(&payload.company, "Company is required")?;

    if state.store.find_advertiser_by_email(&payload.email)?.is_some() {
        return Err(ApiError::Conflict("Advertiser already exists".to_string()));
    }

    let password_hash =
        hash(&payload.password, DEFAULT_COST).map_err(|e| ApiError::Internal(e.into()))?;

    let advertiser = Advertiser {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        password_hash,
        company: payload.company,
        created_at: Utc::now(),
    };
    state.store.insert_advertiser(&advertiser)?;

    info!("✅ Advertiser account created: {}", advertiser.email);

    let response = auth_response(
        &state,
        advertiser.id,
        &advertiser.name,
        &advertiser.email,
        Role::Advertiser,
    )?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/advertisers/login
pub async fn advertiser_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    info!("🔐 Advertiser login attempt: {}", payload.email);

    let advertiser = state
        .store
        .find_advertiser_by_email(&payload.email)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = verify(&payload.password, &advertiser.password_hash)
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !valid {
        warn!("❌ Failed advertiser login: {}", payload.email);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let response = auth_response(
        &state,
        advertiser.id,
        &advertiser.name,
        &advertiser.email,
        Role::Advertiser,
    )?;
    Ok(Json(response))
}

/// POST /api/publishers/signup
pub async fn publisher_signup(
    State(state): State<AppState>,
    Json(payload): Json<PublisherSignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_field(&payload.name, "Name is required")?;
    require_field(&payload.email, "Email is required")?;
    require_field(&payload.password, "Password is required")?;
    require_field(&payload.category, "Category is required")?;

    if state.store.find_publisher_by_email(&payload.email)?.is_some() {
        return Err(ApiError::Conflict("Publisher already exists".to_string()));
    }

    let password_hash =
        hash(&payload.password, DEFAULT_COST).map_err(|e| ApiError::Internal(e.into()))?;

    let publisher = Publisher {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        password_hash,
        category: payload.category.to_lowercase(),
        monthly_earnings_cents: 0,
        is_active: true,
        created_at: Utc::now(),
    };
    state.store.insert_publisher(&publisher)?;

    info!("✅ Publisher account created: {}", publisher.email);

    let response = auth_response(
        &state,
        publisher.id,
        &publisher.name,
        &publisher.email,
        Role::Publisher,
    )?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/publishers/login
pub async fn publisher_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    info!("🔐 Publisher login attempt: {}", payload.email);

    let publisher = state
        .store
        .find_publisher_by_email(&payload.email)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = verify(&payload.password, &publisher.password_hash)
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !valid {
        warn!("❌ Failed publisher login: {}", payload.email);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let response = auth_response(
        &state,
        publisher.id,
        &publisher.name,
        &publisher.email,
        Role::Publisher,
    )?;
    Ok(Json(response))
}

/// GET /api/advertisers/dashboard
pub async fn advertiser_dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<AdvertiserDashboardResponse>, ApiError> {
    let account_id = require_role(&claims, Role::Advertiser)?;
    let advertiser = state
        .store
        .get_advertiser(account_id)?
        .ok_or_else(|| ApiError::NotFound("Advertiser not found".to_string()))?;
    let ads = state.store.list_ads_by_advertiser(account_id)?;
    Ok(Json(AdvertiserDashboardResponse {
        advertiser,
        count: ads.len(),
        ads,
    }))
}

/// GET /api/publishers/dashboard
pub async fn publisher_dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PublisherDashboardResponse>, ApiError> {
    let account_id = require_role(&claims, Role::Publisher)?;
    let publisher = state
        .store
        .get_publisher(account_id)?
        .ok_or_else(|| ApiError::NotFound("Publisher not found".to_string()))?;
    Ok(Json(PublisherDashboardResponse { publisher }))
}

fn auth_response(
    state: &AppState,
    account_id: Uuid,
    name: &str,
    email: &str,
    role: Role,
) -> Result<AuthResponse, ApiError> {
    let (token, expires_in) = state
        .jwt
        .generate_token(account_id, email, role)
        .map_err(ApiError::Internal)?;

    Ok(AuthResponse {
        token,
        expires_in,
        role,
        account: AccountResponse {
            id: account_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct AdvertiserDashboardResponse {
    pub advertiser: Advertiser,
    pub count: usize,
    pub ads: Vec<Ad>,
}

#[derive(Debug, Serialize)]
pub struct PublisherDashboardResponse {
    pub publisher: Publisher,
}
