use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::ads_api;
use crate::auth::{api as auth_api, auth_middleware, JwtHandler};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimiter};
use crate::store::AdStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AdStore>,
    pub jwt: Arc<JwtHandler>,
}

/// Create the API router
pub fn create_router(state: AppState, rate_limiter: RateLimiter) -> Router {
    // Public auth endpoints
    let auth_routes = Router::new()
        .route("/api/advertisers/signup", post(auth_api::advertiser_signup))
        .route("/api/advertisers/login", post(auth_api::advertiser_login))
        .route("/api/publishers/signup", post(auth_api::publisher_signup))
        .route("/api/publishers/login", post(auth_api::publisher_login))
        .with_state(state.clone());

    // JWT-protected endpoints
    let protected_routes = Router::new()
        .route("/api/ads", post(ads_api::create_ad))
        .route(
            "/api/advertisers/dashboard",
            get(auth_api::advertiser_dashboard),
        )
        .route(
            "/api/publishers/dashboard",
            get(auth_api::publisher_dashboard),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Public stream endpoint, rate limited per client IP
    let stream_routes = Router::new()
        .route("/api/ads/stream/:publisher_id", get(ads_api::stream_ad))
        .route_layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(stream_routes)
        .merge(protected_routes)
        .merge(auth_routes)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
