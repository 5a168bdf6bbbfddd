//! Prometheus scrape endpoint.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;

/// Render all metrics in Prometheus text format.
///
/// # Errors
///
/// Returns 503 if no recorder was installed.
#[allow(clippy::unused_async)]
pub async fn render_metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .and_then(|metrics| metrics.render())
        .ok_or(AppError::MetricsUnavailable)
}
