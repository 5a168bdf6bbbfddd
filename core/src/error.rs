//! Error types.

use crate::ids::ServerId;
use crate::request::{RequestKind, Response};
use thiserror::Error;

/// User-visible outcomes that are not a successful sale step.
///
/// None of these are crashes: each one is answered to the client by the
/// actor that detected it and never crosses an actor boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    /// The customer already holds a reservation
    #[error("A ticket has already been reserved!")]
    AlreadyReserved,

    /// Abort or buy without a live reservation
    #[error("No ticket has been reserved!")]
    NoActiveReservation,

    /// Abort or buy without a ticket id in the body
    #[error("No ticket id provided!")]
    MissingTicketArgument,

    /// Abort or buy naming a ticket other than the reserved one
    #[error("Invalid ticket id provided!")]
    TicketArgumentMismatch,

    /// Neither the server cache nor the database has a ticket left
    #[error("SOLD OUT")]
    SoldOut,

    /// The server is draining and takes no new reservations.
    ///
    /// `reassigned` is a freshly picked active server the client should retry
    /// against; it is `None` only if no active server exists.
    #[error("Server is shutting down, please retry on another server!")]
    ServerRetiring {
        /// Where the client should retry
        reassigned: Option<ServerId>,
    },

    /// Scale request with a non-positive count; ignored
    #[error("Invalid number of servers: {0}")]
    InvalidScaleArgument(i64),

    /// Scale request without a count in the body
    #[error("No number of servers provided!")]
    MissingScaleArgument,

    /// Routing found no active server to pick from
    #[error("No active servers available!")]
    NoActiveServers,

    /// A request kind that the receiving actor does not handle
    #[error("Request kind {0} cannot be handled here!")]
    NotRoutable(RequestKind),
}

impl From<SaleError> for Response {
    fn from(error: SaleError) -> Self {
        match error {
            SaleError::SoldOut => Self::SoldOut,
            other => Self::Error(other.to_string()),
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The system must start with at least one server
    #[error("initial_servers must be at least 1")]
    NoInitialServers,

    /// Reservations need a positive timeout
    #[error("timeout must be at least 1 second")]
    ZeroTimeout,

    /// The estimator needs a positive period
    #[error("estimator_interval_ms must be positive")]
    ZeroEstimatorInterval,

    /// Servers must fetch at least one ticket per allocation
    #[error("allocation_batch must be at least 1")]
    ZeroAllocationBatch,
}
