//! Readiness reporting for the health endpoints.

use serde::Serialize;
use std::fmt;

/// Whether the system can take customers right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Servers are running and the pool still has tickets
    Ready,

    /// The central pool is empty. Servers may still hold cached tickets;
    /// otherwise reservations are answered with `SOLD OUT`.
    PoolEmpty,

    /// No active server; routed requests are refused
    NoServers,
}

impl Readiness {
    /// Whether requests are answered normally
    #[must_use]
    pub const fn accepts_requests(self) -> bool {
        !matches!(self, Self::NoServers)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::PoolEmpty => f.write_str("pool_empty"),
            Self::NoServers => f.write_str("no_servers"),
        }
    }
}

/// Counts behind a [`Readiness`] verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Which handler produced the report (`balancer` or `slug`)
    pub system: &'static str,
    /// The verdict
    pub readiness: Readiness,
    /// Servers taking new reservations
    pub active_servers: usize,
    /// Servers finishing their last reservations
    pub draining_servers: usize,
    /// Tickets in the central pool
    pub pooled: usize,
    /// Tickets sold so far
    pub sold: u64,
}

impl HealthReport {
    /// Build a report; the verdict follows from the counts.
    #[must_use]
    pub const fn new(system: &'static str, active_servers: usize, draining_servers: usize, pooled: usize, sold: u64) -> Self {
        let readiness = if active_servers == 0 {
            Readiness::NoServers
        } else if pooled == 0 {
            Readiness::PoolEmpty
        } else {
            Readiness::Ready
        };
        Self {
            system,
            readiness,
            active_servers,
            draining_servers,
            pooled,
            sold,
        }
    }
}
