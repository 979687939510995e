//! Axum HTTP API server.
//!
//! This crate provides:
//! - Video upload and background object detection
//! - Annotated video download
//! - Job status and cancellation endpoints
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, Environment};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
