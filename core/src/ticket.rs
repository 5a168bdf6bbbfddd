//! Tickets and reservations.
//!
//! A [`Ticket`] is deliberately neither `Clone` nor `Copy`: a ticket value can
//! live in exactly one place at a time (the database pool, a server cache, a
//! reservation, or the sold ledger), so moving it between those places is how
//! the conservation invariant is kept.
//!
//! ```text
//! AVAILABLE ──reserve──▶ RESERVED ──sell──▶ SOLD
//!     ▲                     │
//!     └───────abort─────────┘
//! ```

use crate::ids::{CustomerId, TicketId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketState {
    /// Unsold and not held by any customer
    Available,
    /// Held by exactly one reservation
    Reserved,
    /// Sold (terminal)
    Sold,
}

/// A single minted ticket.
#[derive(Debug, PartialEq, Eq)]
pub struct Ticket {
    id: TicketId,
    state: TicketState,
}

impl Ticket {
    /// Mint a fresh, available ticket.
    #[must_use]
    pub const fn new(id: TicketId) -> Self {
        Self {
            id,
            state: TicketState::Available,
        }
    }

    /// Mint `count` tickets with ids `0..count`.
    #[must_use]
    pub fn mint(count: u32) -> Vec<Self> {
        (0..count).map(|id| Self::new(TicketId::new(id))).collect()
    }

    /// The ticket's id
    #[must_use]
    pub const fn id(&self) -> TicketId {
        self.id
    }

    /// The ticket's current state
    #[must_use]
    pub const fn state(&self) -> TicketState {
        self.state
    }

    fn transition(&mut self, from: TicketState, to: TicketState) {
        assert_eq!(
            self.state, from,
            "ticket {} must be {from:?} to become {to:?}",
            self.id
        );
        self.state = to;
    }

    /// AVAILABLE → RESERVED
    ///
    /// # Panics
    ///
    /// Panics if the ticket is not available.
    pub fn reserve(&mut self) {
        self.transition(TicketState::Available, TicketState::Reserved);
    }

    /// RESERVED → AVAILABLE
    ///
    /// # Panics
    ///
    /// Panics if the ticket is not reserved.
    pub fn abort(&mut self) {
        self.transition(TicketState::Reserved, TicketState::Available);
    }

    /// RESERVED → SOLD
    ///
    /// # Panics
    ///
    /// Panics if the ticket is not reserved.
    pub fn sell(&mut self) {
        self.transition(TicketState::Reserved, TicketState::Sold);
    }
}

/// A customer's hold on one ticket.
///
/// Owns its ticket for as long as it lives; aborting or selling consumes the
/// reservation and hands the ticket back to the caller.
#[derive(Debug)]
pub struct Reservation {
    ticket: Ticket,
    customer: CustomerId,
    created_at: DateTime<Utc>,
}

impl Reservation {
    /// Reserve `ticket` for `customer` at time `now`.
    ///
    /// # Panics
    ///
    /// Panics if the ticket is not available.
    #[must_use]
    pub fn new(mut ticket: Ticket, customer: CustomerId, now: DateTime<Utc>) -> Self {
        ticket.reserve();
        Self {
            ticket,
            customer,
            created_at: now,
        }
    }

    /// Id of the reserved ticket
    #[must_use]
    pub const fn ticket_id(&self) -> TicketId {
        self.ticket.id()
    }

    /// The reserving customer
    #[must_use]
    pub const fn customer(&self) -> CustomerId {
        self.customer
    }

    /// When the reservation was made
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Age of the reservation at time `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Whether the reservation has outlived `timeout` at time `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.age(now) > timeout
    }

    /// Release the ticket; it is available again.
    #[must_use]
    pub fn abort(mut self) -> Ticket {
        self.ticket.abort();
        self.ticket
    }

    /// Sell the ticket to the customer.
    #[must_use]
    pub fn sell(mut self) -> Ticket {
        self.ticket.sell();
        self.ticket
    }
}
