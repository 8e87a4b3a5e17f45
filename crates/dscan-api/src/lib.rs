//! Axum HTTP surface of the drive scanner.
//!
//! This crate provides:
//! - `/scan` and `/scan/batch` over the reconciliation engine
//! - Job inspection, status updates and operator retry
//! - The Cloud Tasks probe endpoints
//! - Health, readiness and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
