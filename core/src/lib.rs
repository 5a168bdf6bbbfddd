//! # Ticket Sale Core
//!
//! Core types and boundary contracts for an elastic ticket sale system.
//!
//! A fixed pool of tickets is sold through a fleet of worker servers that can
//! be scaled up and down at runtime. This crate holds everything that has no
//! concurrency of its own:
//!
//! - **Identifiers**: [`CustomerId`], [`ServerId`], [`TicketId`]
//! - **Tickets**: the [`Ticket`] state machine and [`Reservation`]
//! - **Request boundary**: the [`Request`] trait implemented by the transport
//! - **Errors**: the [`SaleError`] taxonomy answered to clients
//! - **Configuration**: [`Config`]
//! - **Environment**: the [`environment::Clock`] used to age reservations
//!
//! The actors themselves live in `ticket-sale-runtime`.

pub mod config;
pub mod error;
pub mod ids;
pub mod request;
pub mod ticket;

pub use config::Config;
pub use error::{ConfigError, SaleError};
pub use ids::{CustomerId, ServerId, TicketId};
pub use request::{Method, Request, RequestHandler, RequestKind, Response};
pub use ticket::{Reservation, Ticket, TicketState};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment module - Dependency injection traits
///
/// External dependencies of the actors are abstracted behind traits so tests
/// can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ticket_sale_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
