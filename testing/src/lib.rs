//! # Ticket Sale Testing
//!
//! Testing utilities and helpers for the ticket sale system.
//!
//! This crate provides:
//! - [`ManualClock`], a clock tests move by hand
//! - An in-memory [`RecordingRequest`] that captures the response
//! - [`CustomerSession`], a client that keeps its sticky server id
//!
//! ## Example
//!
//! ```ignore
//! use ticket_sale_testing::CustomerSession;
//!
//! #[tokio::test]
//! async fn reserve_and_buy() {
//!     let balancer = launch(Config::default()).unwrap();
//!     let mut session = CustomerSession::new(&balancer);
//!
//!     let ticket = session.reserve().await.as_int().unwrap();
//!     session.buy(ticket).await;
//! }
//! ```

pub mod request;
pub mod session;

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use ticket_sale_core::environment::Clock;

/// Deterministic stand-ins for the environment
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, PoisonError, Utc};

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the system under test.
    ///
    /// ```
    /// use ticket_sale_testing::mocks::ManualClock;
    /// use ticket_sale_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::default();
    /// let start = clock.now();
    /// clock.advance(Duration::seconds(11));
    /// assert_eq!(clock.now() - start, Duration::seconds(11));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_time())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089)
    }
}

/// Install a `tracing` subscriber for test output.
///
/// Honors `RUST_LOG`; safe to call from many tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::ManualClock;
pub use request::{PendingResponse, Recorded, RecordingRequest};
pub use session::CustomerSession;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let handle = clock.clone();
        handle.advance(Duration::seconds(5));
        assert_eq!(clock.now(), mocks::test_time() + Duration::seconds(5));
    }

    #[test]
    fn test_time_is_new_year_2025() {
        assert_eq!(mocks::test_time().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
