//! Middleware for the HTTP surface.

pub mod auth;
pub mod cors;

pub use auth::{jwt_auth, AuthUser, JwtClaims, JwtIdentity};
pub use cors::create_cors_layer;
