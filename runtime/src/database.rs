//! Central pool of unallocated tickets.
//!
//! Servers take tickets in batches and give idle ones back in batches, so the
//! pool lock is taken once per batch rather than once per ticket. Sold
//! tickets are consumed into a counter and never pooled again.

use crate::metrics::DatabaseMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use ticket_sale_core::{Ticket, TicketState};

/// The ticket pool shared by all servers.
#[derive(Debug)]
pub struct Database {
    unallocated: Mutex<Vec<Ticket>>,
    sold: AtomicU64,
    minted: u32,
}

impl Database {
    /// Mint `tickets` fresh tickets into the pool.
    #[must_use]
    pub fn new(tickets: u32) -> Self {
        DatabaseMetrics::record_available(tickets as usize);
        Self {
            unallocated: Mutex::new(Ticket::mint(tickets)),
            sold: AtomicU64::new(0),
            minted: tickets,
        }
    }

    fn pool(&self) -> MutexGuard<'_, Vec<Ticket>> {
        self.unallocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove up to `count` tickets from the pool.
    ///
    /// Returns fewer (possibly none) when the pool is smaller. Never blocks
    /// beyond the pool lock.
    pub fn allocate(&self, count: usize) -> Vec<Ticket> {
        let (batch, remaining) = {
            let mut pool = self.pool();
            let split = pool.len().saturating_sub(count);
            let batch = pool.split_off(split);
            (batch, pool.len())
        };

        DatabaseMetrics::record_allocation(remaining);
        tracing::debug!(requested = count, granted = batch.len(), remaining, "Allocated tickets");

        batch
    }

    /// Return a batch of available tickets to the pool.
    ///
    /// # Panics
    ///
    /// Panics if a returned ticket is not in the available state.
    pub fn deallocate(&self, tickets: Vec<Ticket>) {
        if tickets.is_empty() {
            return;
        }
        assert!(
            tickets.iter().all(|t| t.state() == TicketState::Available),
            "only available tickets may be returned to the database"
        );

        let returned = tickets.len();
        let remaining = {
            let mut pool = self.pool();
            pool.extend(tickets);
            pool.len()
        };

        DatabaseMetrics::record_deallocation(remaining);
        tracing::debug!(returned, remaining, "Deallocated tickets");
    }

    /// Number of tickets currently in the pool.
    pub fn num_available(&self) -> usize {
        self.pool().len()
    }

    /// Record a sold ticket; it leaves circulation for good.
    ///
    /// # Panics
    ///
    /// Panics if the ticket is not in the sold state.
    pub fn record_sale(&self, ticket: Ticket) {
        assert_eq!(ticket.state(), TicketState::Sold, "ticket {} was not sold", ticket.id());
        self.sold.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of tickets sold so far
    pub fn num_sold(&self) -> u64 {
        self.sold.load(Ordering::Acquire)
    }

    /// Number of tickets minted at startup
    #[must_use]
    pub const fn minted(&self) -> u32 {
        self.minted
    }
}
