//! Authentication
//!
//! Advertiser and publisher accounts with bcrypt-hashed credentials and
//! JWT-based request-scoped auth context. There is no server-side session
//! state: the validated claims ride on the request extensions.

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use models::{Claims, Role};
