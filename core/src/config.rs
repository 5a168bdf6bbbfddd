//! Configuration of the ticket sale system.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Sale system configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of tickets minted at startup
    pub tickets: u32,
    /// Seconds after which a reservation expires
    pub timeout: u32,
    /// Number of servers started at launch
    pub initial_servers: usize,
    /// Fixed period of the estimator loop in milliseconds
    pub estimator_interval_ms: u64,
    /// Tickets a server fetches from the database when its cache runs dry
    pub allocation_batch: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tickets: 1000,
            timeout: 10,
            initial_servers: 1,
            estimator_interval_ms: 1000,
            allocation_batch: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `TICKETS`, `TIMEOUT`, `INITIAL_SERVERS`, `ESTIMATOR_INTERVAL_MS`
    /// and `ALLOCATION_BATCH`. Missing or unparsable values fall back to the
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            tickets: lookup("TICKETS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tickets),
            timeout: lookup("TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout),
            initial_servers: lookup("INITIAL_SERVERS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.initial_servers),
            estimator_interval_ms: lookup("ESTIMATOR_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.estimator_interval_ms),
            allocation_batch: lookup("ALLOCATION_BATCH")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.allocation_batch),
        }
    }

    /// Set the number of tickets
    #[must_use]
    pub const fn with_tickets(mut self, tickets: u32) -> Self {
        self.tickets = tickets;
        self
    }

    /// Set the reservation timeout in seconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of initial servers
    #[must_use]
    pub const fn with_initial_servers(mut self, servers: usize) -> Self {
        self.initial_servers = servers;
        self
    }

    /// Set the estimator period
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // periods beyond u64 milliseconds are not meaningful
    pub const fn with_estimator_interval(mut self, interval: Duration) -> Self {
        self.estimator_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the allocation batch size
    #[must_use]
    pub const fn with_allocation_batch(mut self, batch: u32) -> Self {
        self.allocation_batch = batch;
        self
    }

    /// Reservation timeout
    #[must_use]
    pub fn reservation_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.timeout))
    }

    /// Estimator period
    #[must_use]
    pub const fn estimator_interval(&self) -> Duration {
        Duration::from_millis(self.estimator_interval_ms)
    }

    /// Check that the configuration can run.
    ///
    /// # Errors
    ///
    /// Returns the first offending setting.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_servers == 0 {
            return Err(ConfigError::NoInitialServers);
        }
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.estimator_interval_ms == 0 {
            return Err(ConfigError::ZeroEstimatorInterval);
        }
        if self.allocation_batch == 0 {
            return Err(ConfigError::ZeroAllocationBatch);
        }
        Ok(())
    }
}
