//! Axum middleware shared by the HTTP services.

pub mod metrics;
pub mod tracing;
