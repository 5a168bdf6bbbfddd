//! Application state for Axum handlers.

use std::sync::Arc;
use ticket_sale_runtime::SaleSystem;
use ticket_sale_runtime::metrics::MetricsServer;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The sale system requests are handed to
    pub system: Arc<dyn SaleSystem>,
    /// Installed Prometheus recorder, if any
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// Create state without a metrics recorder.
    #[must_use]
    pub fn new(system: Arc<dyn SaleSystem>) -> Self {
        Self { system, metrics: None }
    }

    /// Attach a metrics recorder for the `/metrics` endpoint.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
