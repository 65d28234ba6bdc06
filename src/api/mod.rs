//! HTTP API modules

pub mod ads_api;
pub mod error;
pub mod routes;

pub use routes::{create_router, AppState};
