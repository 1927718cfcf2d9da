//! HTTP and WebSocket surface for Huddle.
//!
//! This module exposes the chat core to browsers: a WebSocket endpoint for
//! the live protocol and a small REST API for history reads.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod ws;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
