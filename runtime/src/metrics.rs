//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for all sale system components:
//! - Reservation outcomes per server
//! - Database pool transfers
//! - Server registry sizes
//! - Estimator rounds
//! - Balancer re-routing
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_sale_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut metrics = MetricsServer::new();
//! metrics.start()?;
//!
//! // Prometheus text, e.g. for a `/metrics` endpoint
//! let body = metrics.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder whose output is served by the HTTP adapter.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled metrics server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs
    /// a warning and leaves [`MetricsServer::render`] returning `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Server Metrics
    describe_counter!(
        "ticket_sale_reservations_total",
        "Total number of tickets reserved"
    );
    describe_counter!("ticket_sale_sales_total", "Total number of tickets sold");
    describe_counter!(
        "ticket_sale_aborts_total",
        "Total number of purchases aborted by customers"
    );
    describe_counter!(
        "ticket_sale_expirations_total",
        "Total number of reservations aborted by timeout"
    );
    describe_counter!(
        "ticket_sale_sold_out_total",
        "Total number of reservations refused because no tickets were left"
    );
    describe_counter!(
        "ticket_sale_retiring_total",
        "Total number of reservations refused by draining servers"
    );

    // Database Metrics
    describe_gauge!(
        "ticket_sale_database_available",
        "Tickets currently in the database pool"
    );
    describe_counter!(
        "ticket_sale_database_allocations_total",
        "Total number of batch allocations from the database"
    );
    describe_counter!(
        "ticket_sale_database_deallocations_total",
        "Total number of batch returns to the database"
    );

    // Registry Metrics
    describe_gauge!("ticket_sale_servers_active", "Number of active servers");
    describe_gauge!("ticket_sale_servers_draining", "Number of draining servers");

    // Estimator Metrics
    describe_histogram!(
        "ticket_sale_estimator_round_duration_seconds",
        "Time taken by one estimator round"
    );

    // Balancer Metrics
    describe_counter!(
        "ticket_sale_balancer_reroutes_total",
        "Total number of requests re-routed after a mailbox closed"
    );
}

/// Server metrics recorder.
pub struct ServerMetrics;

impl ServerMetrics {
    /// Record a reservation.
    pub fn record_reservation() {
        counter!("ticket_sale_reservations_total").increment(1);
    }

    /// Record a sale.
    pub fn record_sale() {
        counter!("ticket_sale_sales_total").increment(1);
    }

    /// Record a customer abort.
    pub fn record_abort() {
        counter!("ticket_sale_aborts_total").increment(1);
    }

    /// Record reservations aborted by timeout.
    pub fn record_expirations(count: usize) {
        counter!("ticket_sale_expirations_total").increment(count as u64);
    }

    /// Record a sold-out reply.
    pub fn record_sold_out() {
        counter!("ticket_sale_sold_out_total").increment(1);
    }

    /// Record a reservation refused while draining.
    pub fn record_retiring() {
        counter!("ticket_sale_retiring_total").increment(1);
    }
}

/// Database metrics recorder.
pub struct DatabaseMetrics;

impl DatabaseMetrics {
    /// Record the pool size.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_available(available: usize) {
        gauge!("ticket_sale_database_available").set(available as f64);
    }

    /// Record a batch allocation.
    pub fn record_allocation(available: usize) {
        counter!("ticket_sale_database_allocations_total").increment(1);
        Self::record_available(available);
    }

    /// Record a batch return.
    pub fn record_deallocation(available: usize) {
        counter!("ticket_sale_database_deallocations_total").increment(1);
        Self::record_available(available);
    }
}

/// Registry metrics recorder.
pub struct RegistryMetrics;

impl RegistryMetrics {
    /// Record registry sizes.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_sizes(active: usize, draining: usize) {
        gauge!("ticket_sale_servers_active").set(active as f64);
        gauge!("ticket_sale_servers_draining").set(draining as f64);
    }
}

/// Estimator metrics recorder.
pub struct EstimatorMetrics;

impl EstimatorMetrics {
    /// Record one round.
    pub fn record_round(duration: Duration) {
        histogram!("ticket_sale_estimator_round_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Balancer metrics recorder.
pub struct BalancerMetrics;

impl BalancerMetrics {
    /// Record a request re-routed after its mailbox closed.
    pub fn record_reroute() {
        counter!("ticket_sale_balancer_reroutes_total").increment(1);
    }
}
