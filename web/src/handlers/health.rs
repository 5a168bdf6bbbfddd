//! Liveness and readiness checks.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use ticket_sale_runtime::HealthReport;

/// `GET /health`: the process is up and serving HTTP.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// `GET /health/ready`: whether the sale system can take customers.
///
/// An empty pool is still ready (reservations get `SOLD OUT`). With no
/// active servers nothing can be routed, so the check fails with 503.
#[allow(clippy::unused_async)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.system.health();
    let status = if report.readiness.accepts_requests() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(health_check().await, (StatusCode::OK, "ok"));
    }
}
