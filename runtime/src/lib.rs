//! # Ticket Sale Runtime
//!
//! The concurrent half of the ticket sale system.
//!
//! ## Core Components
//!
//! - **Mailbox**: dual-priority queue every actor receives from
//! - **Database**: the pool of tickets not held by any server
//! - **Server**: worker actor with a local ticket cache and reservations
//! - **Estimator**: periodic actor broadcasting availability estimates
//! - **Coordinator**: server registry, scaling, and shared context
//! - **Balancer**: the [`RequestHandler`] the transport calls
//! - **Slug**: a sequential single-server handler with the same answers,
//!   used as a reference
//!
//! ## Example
//!
//! ```ignore
//! use ticket_sale_core::{Config, RequestHandler};
//! use ticket_sale_runtime::launch;
//!
//! let balancer = launch(Config::default().with_tickets(100))?;
//!
//! // From any transport thread
//! balancer.handle(request);
//! ```

use std::sync::Arc;
use ticket_sale_core::{Config, RequestHandler};
use ticket_sale_core::environment::{Clock, SystemClock};
use tokio::runtime::Handle;
use tokio::sync::watch;

pub mod balancer;
pub mod coordinator;
pub mod database;
pub mod estimator;
pub mod health;
pub mod mailbox;
/// Prometheus metrics for observability
pub mod metrics;
pub mod server;
pub mod slug;

pub use balancer::Balancer;
pub use coordinator::{Coordinator, RegistrySummary, SystemSnapshot};
pub use database::Database;
pub use estimator::{Estimator, EstimatorMsg};
pub use health::{HealthReport, Readiness};
pub use mailbox::{Mailbox, MailboxClosed, Priority};
pub use server::{Server, ServerMsg, ServerSnapshot, ServerState};
pub use slug::Slug;

/// Error types for starting the runtime
pub mod error {
    use thiserror::Error;
    use ticket_sale_core::ConfigError;

    /// Errors that can occur while launching the sale system
    #[derive(Error, Debug)]
    pub enum LaunchError {
        /// The configuration was rejected
        #[error("Invalid configuration: {0}")]
        Config(#[from] ConfigError),

        /// `launch` was called outside of a tokio runtime
        ///
        /// Server and estimator tasks need a runtime to be spawned on.
        #[error("No tokio runtime available: {0}")]
        NoRuntime(#[from] tokio::runtime::TryCurrentError),
    }
}

pub use error::LaunchError;

/// Start the sale system with the wall clock.
///
/// # Errors
///
/// Returns [`LaunchError`] if the configuration is invalid or no tokio
/// runtime is running on the current thread.
pub fn launch(config: Config) -> Result<Balancer, LaunchError> {
    launch_with_clock(config, Arc::new(SystemClock))
}

/// Start the sale system with an injected clock.
///
/// Mints the tickets, spawns the estimator, starts
/// `config.initial_servers` servers, and returns the balancer.
///
/// # Errors
///
/// Returns [`LaunchError`] if the configuration is invalid or no tokio
/// runtime is running on the current thread.
pub fn launch_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Balancer, LaunchError> {
    config.validate()?;
    let runtime = Handle::try_current()?;

    let coordinator = Coordinator::new(config, clock, runtime.clone());

    let (shutdown, signal) = watch::channel(false);
    runtime.spawn(Estimator::new(Arc::clone(&coordinator), signal).run());

    let active = coordinator.scale(config.initial_servers);
    tracing::info!(
        tickets = config.tickets,
        timeout_secs = config.timeout,
        servers = active,
        "Ticket sale system launched"
    );

    Ok(Balancer::new(coordinator, shutdown))
}

/// A complete sale system the transport can serve.
///
/// Implemented by the elastic [`Balancer`] and by the sequential [`Slug`].
pub trait SaleSystem: RequestHandler + std::fmt::Debug {
    /// Counts and verdict for the readiness endpoint.
    fn health(&self) -> HealthReport;

    /// Stop background work. Requests keep being answered.
    fn shutdown(&self);
}

impl SaleSystem for Balancer {
    fn health(&self) -> HealthReport {
        let summary = self.coordinator().registry_summary();
        HealthReport::new(
            "balancer",
            summary.active.len(),
            summary.draining,
            summary.database_available,
            summary.sold,
        )
    }

    fn shutdown(&self) {
        self.stop_estimator();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn launch_outside_a_runtime_fails() {
        let result = launch(Config::default());
        assert!(matches!(result, Err(LaunchError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn launch_rejects_invalid_config() {
        let result = launch(Config::default().with_initial_servers(0));
        assert!(matches!(result, Err(LaunchError::Config(_))));
    }

    #[tokio::test]
    async fn launch_starts_initial_servers() {
        let balancer = launch(Config::default().with_initial_servers(3)).unwrap();
        assert_eq!(balancer.coordinator().num_active(), 3);

        let health = balancer.health();
        assert_eq!(health.readiness, Readiness::Ready);
        assert_eq!(health.active_servers, 3);
        assert_eq!(health.pooled, 1000);
    }

    #[tokio::test]
    async fn empty_pool_is_reported() {
        let balancer = launch(Config::default().with_tickets(0)).unwrap();
        assert_eq!(balancer.health().readiness, Readiness::PoolEmpty);
    }

    #[tokio::test]
    async fn retiring_every_server_fails_readiness() {
        let balancer = launch(Config::default().with_initial_servers(2)).unwrap();
        balancer.coordinator().scale(0);

        let health = balancer.health();
        assert_eq!(health.readiness, Readiness::NoServers);
        assert!(!health.readiness.accepts_requests());
    }
}
