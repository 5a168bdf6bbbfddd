//! Axum adapter for the ticket sale system.
//!
//! The sale system only knows the [`Request`](ticket_sale_core::Request)
//! boundary. This crate turns HTTP requests into [`HttpExchange`]s, hands
//! them to the [`Balancer`](ticket_sale_runtime::Balancer), and turns the
//! answers back into HTTP responses.
//!
//! # Routes
//!
//! | Method     | Path                          | Answer                           |
//! |------------|-------------------------------|----------------------------------|
//! | GET        | `/api/admin/num_servers`      | number of active servers         |
//! | POST       | `/api/admin/num_servers`      | scale to the body's count        |
//! | GET        | `/api/admin/get_servers`      | active server ids, one per line  |
//! | GET        | `/api/num_available_tickets`  | availability estimate            |
//! | POST       | `/api/reserve_ticket`         | reserved ticket id or `SOLD OUT` |
//! | POST       | `/api/buy_ticket`             | bought ticket id                 |
//! | POST       | `/api/abort_purchase`         | released ticket id               |
//! | GET        | `/api/debug...`               | registry summary (JSON)          |
//! | GET        | `/health`, `/health/ready`    | liveness, readiness              |
//! | GET        | `/metrics`                    | Prometheus text                  |
//!
//! Every API answer carries `X-Customer-Id`, and `X-Server-Id` once a server
//! has been assigned. Clients echo both back to keep their reservation.

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod exchange;
pub mod handlers;
pub mod state;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use config::ServerConfig;
pub use error::AppError;
pub use exchange::{Answer, CUSTOMER_ID_HEADER, HttpExchange, SERVER_ID_HEADER};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::render_metrics))
        .fallback(handlers::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
