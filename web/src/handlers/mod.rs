//! HTTP request handlers.

pub mod api;
pub mod health;
pub mod metrics;

// Re-export common handler utilities
pub use api::dispatch;
pub use health::{health_check, readiness};
pub use metrics::render_metrics;
