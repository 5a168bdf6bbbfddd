//! Sequential reference handler.
//!
//! The slug sells the same tickets with the same answers as the elastic
//! system, but does everything under one lock on one imaginary server: no
//! mailboxes, no estimator, no scaling. Its availability figure is exact;
//! the runtime tests replay customer scripts against both and compare.

use crate::SaleSystem;
use crate::health::HealthReport;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use ticket_sale_core::environment::{Clock, SystemClock};
use ticket_sale_core::{
    Config, CustomerId, Method, Request, RequestHandler, RequestKind, Reservation, Response, SaleError, ServerId,
    Ticket,
};

/// Answer to `POST /api/admin/num_servers`.
pub const SCALING_UNSUPPORTED: &str = "Slug does not support on-demand scaling!";

/// Answer to `GET /api/debug`.
pub const DEBUG_GREETING: &str = "This is 🐌.";

#[derive(Debug)]
struct Shelf {
    available: Vec<Ticket>,
    reservations: HashMap<CustomerId, Reservation>,
    sold: u64,
}

/// One lock, one server, every request handled in arrival order.
pub struct Slug {
    id: ServerId,
    timeout: chrono::Duration,
    clock: Arc<dyn Clock>,
    shelf: Mutex<Shelf>,
}

impl Slug {
    /// Mint `config.tickets` tickets onto a fresh shelf.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`Slug::new`] with an injected clock.
    #[must_use]
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let mut available = Ticket::mint(config.tickets);
        // Served from the top of the stack: lowest ids first.
        available.reverse();

        tracing::info!(tickets = config.tickets, timeout_secs = config.timeout, "Slug ready");
        Self {
            id: ServerId::new(),
            timeout: config.reservation_timeout(),
            clock,
            shelf: Mutex::new(Shelf {
                available,
                reservations: HashMap::new(),
                sold: 0,
            }),
        }
    }

    /// The id stamped on every routed answer
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        self.id
    }

    fn clear_expired(&self, shelf: &mut Shelf) {
        let now = self.clock.now();
        let expired: Vec<CustomerId> = shelf
            .reservations
            .iter()
            .filter(|(_, reservation)| reservation.is_expired(now, self.timeout))
            .map(|(customer, _)| *customer)
            .collect();

        for customer in expired {
            if let Some(reservation) = shelf.reservations.remove(&customer) {
                tracing::debug!(%customer, ticket_id = %reservation.ticket_id(), "Reservation expired");
                shelf.available.push(reservation.abort());
            }
        }
    }

    fn answer(&self, shelf: &mut Shelf, request: &mut dyn Request) -> Response {
        match request.kind() {
            RequestKind::NumServers => match request.method() {
                Method::Get => Response::Int(1),
                Method::Post => match request.read_int() {
                    None => SaleError::MissingScaleArgument.into(),
                    Some(_) => Response::Error(SCALING_UNSUPPORTED.to_string()),
                },
            },
            RequestKind::GetServers => Response::ServerIds(vec![self.id]),
            RequestKind::Debug => Response::Text(DEBUG_GREETING.to_string()),
            RequestKind::NumAvailableTickets => {
                request.set_server_id(self.id);
                Response::Int(shelf.available.len() as u64)
            }
            RequestKind::ReserveTicket => {
                request.set_server_id(self.id);
                Self::reserve(shelf, request.customer_id(), self.clock.now()).unwrap_or_else(Response::from)
            }
            RequestKind::AbortPurchase => {
                request.set_server_id(self.id);
                match Self::take_reservation(shelf, request) {
                    Ok(reservation) => {
                        let ticket = reservation.abort();
                        let id = ticket.id();
                        shelf.available.push(ticket);
                        Response::Int(u64::from(id.get()))
                    }
                    Err(error) => error.into(),
                }
            }
            RequestKind::BuyTicket => {
                request.set_server_id(self.id);
                match Self::take_reservation(shelf, request) {
                    Ok(reservation) => {
                        let ticket = reservation.sell();
                        shelf.sold += 1;
                        Response::Int(u64::from(ticket.id().get()))
                    }
                    Err(error) => error.into(),
                }
            }
        }
    }

    fn reserve(shelf: &mut Shelf, customer: CustomerId, now: chrono::DateTime<chrono::Utc>) -> Result<Response, SaleError> {
        if shelf.reservations.contains_key(&customer) {
            return Err(SaleError::AlreadyReserved);
        }
        let ticket = shelf.available.pop().ok_or(SaleError::SoldOut)?;
        let reservation = Reservation::new(ticket, customer, now);
        let id = reservation.ticket_id();
        shelf.reservations.insert(customer, reservation);
        Ok(Response::Int(u64::from(id.get())))
    }

    fn take_reservation(shelf: &mut Shelf, request: &mut dyn Request) -> Result<Reservation, SaleError> {
        let customer = request.customer_id();
        let reserved = shelf
            .reservations
            .get(&customer)
            .map(Reservation::ticket_id)
            .ok_or(SaleError::NoActiveReservation)?;

        let argument = request.read_int().ok_or(SaleError::MissingTicketArgument)?;
        if !reserved.matches(argument) {
            return Err(SaleError::TicketArgumentMismatch);
        }

        shelf
            .reservations
            .remove(&customer)
            .ok_or(SaleError::NoActiveReservation)
    }
}

impl RequestHandler for Slug {
    fn handle(&self, mut request: Box<dyn Request>) {
        let response = {
            let mut shelf = self.shelf.lock().unwrap_or_else(PoisonError::into_inner);
            self.clear_expired(&mut shelf);
            self.answer(&mut shelf, request.as_mut())
        };
        request.respond(response);
    }
}

impl SaleSystem for Slug {
    fn health(&self) -> HealthReport {
        let shelf = self.shelf.lock().unwrap_or_else(PoisonError::into_inner);
        HealthReport::new("slug", 1, 0, shelf.available.len(), shelf.sold)
    }

    fn shutdown(&self) {}
}

impl fmt::Debug for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shelf = self.shelf.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Slug")
            .field("id", &self.id)
            .field("available", &shelf.available.len())
            .field("reserved", &shelf.reservations.len())
            .field("sold", &shelf.sold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticket_sale_testing::{CustomerSession, ManualClock};

    fn slug(tickets: u32) -> (Slug, ManualClock) {
        let clock = ManualClock::default();
        let config = Config::default().with_tickets(tickets).with_timeout(10);
        (Slug::with_clock(&config, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn sells_lowest_ids_first_then_sells_out() {
        let (slug, _) = slug(2);
        let mut first = CustomerSession::new(&slug);
        let mut second = CustomerSession::new(&slug);
        let mut third = CustomerSession::new(&slug);

        assert_eq!(first.reserve().await, Response::Int(0));
        assert_eq!(second.reserve().await, Response::Int(1));
        assert_eq!(third.reserve().await, Response::SoldOut);
        assert_eq!(first.server(), Some(slug.server_id()));
    }

    #[tokio::test]
    async fn buy_and_abort_check_the_reservation() {
        let (slug, _) = slug(3);
        let mut customer = CustomerSession::new(&slug);

        assert_eq!(customer.buy(0).await, Response::from(SaleError::NoActiveReservation));
        let id = customer.reserve().await.as_int().unwrap();
        assert_eq!(customer.reserve().await, Response::from(SaleError::AlreadyReserved));
        assert_eq!(customer.buy(id + 1).await, Response::from(SaleError::TicketArgumentMismatch));
        let missing = customer.send(Method::Post, RequestKind::AbortPurchase, None).await;
        assert_eq!(missing, Response::from(SaleError::MissingTicketArgument));

        assert_eq!(customer.abort(id).await, Response::Int(id));
        assert_eq!(customer.num_available().await, Response::Int(3));

        let id = customer.reserve().await.as_int().unwrap();
        assert_eq!(customer.buy(id).await, Response::Int(id));
        assert_eq!(customer.num_available().await, Response::Int(2));
        assert_eq!(slug.health().sold, 1);
    }

    #[tokio::test]
    async fn expired_reservations_return_to_the_shelf() {
        let (slug, clock) = slug(1);
        let mut holder = CustomerSession::new(&slug);
        let mut other = CustomerSession::new(&slug);

        let id = holder.reserve().await.as_int().unwrap();
        clock.advance(Duration::seconds(10));
        assert_eq!(other.reserve().await, Response::SoldOut);

        clock.advance(Duration::seconds(1));
        assert_eq!(other.reserve().await, Response::Int(id));
        assert_eq!(holder.buy(id).await, Response::from(SaleError::NoActiveReservation));
    }

    #[tokio::test]
    async fn administration_is_fixed_at_one_server() {
        let (slug, _) = slug(1);
        let mut admin = CustomerSession::new(&slug);

        assert_eq!(admin.num_servers().await, Response::Int(1));
        assert_eq!(admin.set_num_servers(4).await, Response::Error(SCALING_UNSUPPORTED.to_string()));
        let missing = admin.send(Method::Post, RequestKind::NumServers, None).await;
        assert_eq!(missing, Response::from(SaleError::MissingScaleArgument));
        assert_eq!(admin.get_servers().await, Response::ServerIds(vec![slug.server_id()]));
        assert_eq!(admin.debug().await, Response::Text(DEBUG_GREETING.to_string()));
    }
}
