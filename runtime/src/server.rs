//! Worker actor.
//!
//! A server owns a local cache of tickets and the reservations of the
//! customers routed to it. All of that state lives inside the server's task
//! and is only touched while handling a message from its mailbox.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──Shutdown──▶ Draining ──(no reservations, empty mailbox)──▶ Terminated
//! ```
//!
//! A draining server refuses new reservations but still completes buys and
//! aborts for reservations it already holds. It terminates once the last
//! reservation is gone and its mailbox can be closed while empty.

use crate::coordinator::Coordinator;
use crate::estimator::EstimatorMsg;
use crate::mailbox::Mailbox;
use crate::metrics::ServerMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use ticket_sale_core::{CustomerId, Request, RequestKind, Reservation, Response, SaleError, ServerId, Ticket};
use tokio::sync::oneshot;

/// Messages understood by a server.
#[derive(Debug)]
pub enum ServerMsg {
    /// A client request routed by the balancer
    ProcessRequest(Box<dyn Request>),
    /// Start draining: flush idle tickets and refuse new reservations
    Shutdown,
    /// The estimator's latest figure for tickets held elsewhere
    TicketsAvailable(usize),
    /// Report cache and reservation counts
    Snapshot(oneshot::Sender<ServerSnapshot>),
}

/// Server lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Accepts new reservations
    Active,
    /// Finishing existing reservations only
    Draining,
    /// Processing loop has exited
    Terminated,
}

/// Point-in-time view of one server, used for auditing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServerSnapshot {
    /// Server id
    pub id: ServerId,
    /// State when the snapshot was taken
    pub state: ServerState,
    /// Idle tickets in the local cache
    pub cached: usize,
    /// Live reservations
    pub reserved: usize,
}

/// A worker actor. Construct with [`Server::new`] and drive with [`Server::run`].
pub struct Server {
    id: ServerId,
    state: ServerState,
    mailbox: Arc<Mailbox<ServerMsg>>,
    coordinator: Arc<Coordinator>,
    cache: Vec<Ticket>,
    reservations: HashMap<CustomerId, Reservation>,
    estimate: usize,
    timeout: chrono::Duration,
    batch: usize,
}

impl Server {
    /// Create an active server with an empty cache.
    #[must_use]
    pub fn new(id: ServerId, mailbox: Arc<Mailbox<ServerMsg>>, coordinator: Arc<Coordinator>) -> Self {
        let config = coordinator.config();
        Self {
            id,
            state: ServerState::Active,
            timeout: config.reservation_timeout(),
            batch: config.allocation_batch as usize,
            mailbox,
            coordinator,
            cache: Vec::new(),
            reservations: HashMap::new(),
            estimate: 0,
        }
    }

    /// Process messages until the server has drained.
    ///
    /// Returns after the mailbox has been closed and the coordinator has been
    /// told the server is terminated.
    pub async fn run(mut self) {
        tracing::info!(server_id = %self.id, "Server started");

        loop {
            let message = self.mailbox.recv().await;
            self.handle(message);
            if self.ready_to_terminate() {
                break;
            }
        }

        self.state = ServerState::Terminated;
        self.coordinator.mark_terminated(self.id);
        tracing::info!(server_id = %self.id, "Server terminated");
    }

    fn ready_to_terminate(&self) -> bool {
        self.state == ServerState::Draining
            && self.reservations.is_empty()
            && self.mailbox.close_if_empty()
    }

    fn handle(&mut self, message: ServerMsg) {
        self.evict_expired();

        match message {
            ServerMsg::ProcessRequest(request) => self.process_request(request),
            ServerMsg::Shutdown => self.shutdown(),
            ServerMsg::TicketsAvailable(estimate) => self.update_estimate(estimate),
            ServerMsg::Snapshot(reply) => {
                // Auditor may have given up waiting.
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            id: self.id,
            state: self.state,
            cached: self.cache.len(),
            reserved: self.reservations.len(),
        }
    }

    /// Abort every reservation older than the timeout.
    fn evict_expired(&mut self) {
        let now = self.coordinator.now();
        let expired: Vec<CustomerId> = self
            .reservations
            .iter()
            .filter(|(_, reservation)| reservation.is_expired(now, self.timeout))
            .map(|(customer, _)| *customer)
            .collect();

        if expired.is_empty() {
            return;
        }

        let released: Vec<Ticket> = expired
            .iter()
            .filter_map(|customer| self.reservations.remove(customer))
            .map(Reservation::abort)
            .collect();

        ServerMetrics::record_expirations(released.len());
        tracing::debug!(server_id = %self.id, expired = released.len(), "Evicted expired reservations");
        self.release(released);
    }

    /// Put available tickets back where they belong for the current state.
    fn release(&mut self, tickets: Vec<Ticket>) {
        match self.state {
            ServerState::Active => self.cache.extend(tickets),
            ServerState::Draining | ServerState::Terminated => {
                self.coordinator.database().deallocate(tickets);
            }
        }
    }

    fn shutdown(&mut self) {
        if self.state != ServerState::Active {
            tracing::debug!(server_id = %self.id, "Ignoring repeated shutdown");
            return;
        }

        let idle = std::mem::take(&mut self.cache);
        let flushed = idle.len();
        self.coordinator.database().deallocate(idle);
        self.state = ServerState::Draining;

        tracing::info!(
            server_id = %self.id,
            flushed,
            reservations = self.reservations.len(),
            "Server draining"
        );
    }

    fn update_estimate(&mut self, estimate: usize) {
        self.estimate = estimate;

        let report = EstimatorMsg::ServerAvailable {
            server: self.id,
            available: self.cache.len(),
        };
        if self.coordinator.estimator_mailbox().send_high(report).is_err() {
            tracing::debug!(server_id = %self.id, "Estimator stopped, report dropped");
        }
    }

    fn process_request(&mut self, mut request: Box<dyn Request>) {
        request.set_server_id(self.id);
        let kind = request.kind();
        let customer = request.customer_id();

        let outcome = match kind {
            RequestKind::NumAvailableTickets => Ok(Response::Int((self.estimate + self.cache.len()) as u64)),
            RequestKind::ReserveTicket => self.reserve(request.as_mut()),
            RequestKind::BuyTicket => self.buy(request.as_mut()),
            RequestKind::AbortPurchase => self.abort(request.as_mut()),
            RequestKind::NumServers | RequestKind::GetServers | RequestKind::Debug => {
                Err(SaleError::NotRoutable(kind))
            }
        };

        match outcome {
            Ok(response) => request.respond(response),
            Err(error) => {
                tracing::debug!(server_id = %self.id, %customer, %kind, %error, "Request rejected");
                request.respond(error.into());
            }
        }
    }

    fn reserve(&mut self, request: &mut dyn Request) -> Result<Response, SaleError> {
        let customer = request.customer_id();
        if self.reservations.contains_key(&customer) {
            return Err(SaleError::AlreadyReserved);
        }

        if self.state != ServerState::Active {
            let reassigned = self.coordinator.pick_random_server().map(|(id, _)| id);
            if let Some(id) = reassigned {
                request.set_server_id(id);
            }
            ServerMetrics::record_retiring();
            return Err(SaleError::ServerRetiring { reassigned });
        }

        if self.cache.is_empty() {
            self.cache = self.coordinator.database().allocate(self.batch);
        }
        let Some(ticket) = self.cache.pop() else {
            ServerMetrics::record_sold_out();
            return Err(SaleError::SoldOut);
        };

        let reservation = Reservation::new(ticket, customer, self.coordinator.now());
        let ticket_id = reservation.ticket_id();
        self.reservations.insert(customer, reservation);

        ServerMetrics::record_reservation();
        tracing::debug!(server_id = %self.id, %customer, %ticket_id, "Ticket reserved");
        Ok(Response::Int(u64::from(ticket_id.get())))
    }

    fn buy(&mut self, request: &mut dyn Request) -> Result<Response, SaleError> {
        let reservation = self.take_reservation(request)?;
        let ticket_id = reservation.ticket_id();
        self.coordinator.database().record_sale(reservation.sell());

        ServerMetrics::record_sale();
        tracing::debug!(server_id = %self.id, customer = %request.customer_id(), %ticket_id, "Ticket sold");
        Ok(Response::Int(u64::from(ticket_id.get())))
    }

    fn abort(&mut self, request: &mut dyn Request) -> Result<Response, SaleError> {
        let reservation = self.take_reservation(request)?;
        let ticket_id = reservation.ticket_id();
        self.release(vec![reservation.abort()]);

        ServerMetrics::record_abort();
        tracing::debug!(server_id = %self.id, customer = %request.customer_id(), %ticket_id, "Purchase aborted");
        Ok(Response::Int(u64::from(ticket_id.get())))
    }

    /// Remove the customer's reservation if the request names its ticket.
    fn take_reservation(&mut self, request: &mut dyn Request) -> Result<Reservation, SaleError> {
        let customer = request.customer_id();
        let reserved = self
            .reservations
            .get(&customer)
            .map(Reservation::ticket_id)
            .ok_or(SaleError::NoActiveReservation)?;

        let argument = request.read_int().ok_or(SaleError::MissingTicketArgument)?;
        if !reserved.matches(argument) {
            return Err(SaleError::TicketArgumentMismatch);
        }

        self.reservations
            .remove(&customer)
            .ok_or(SaleError::NoActiveReservation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticket_sale_core::{Config, RequestKind};
    use ticket_sale_testing::{ManualClock, RecordingRequest};
    use tokio::runtime::Handle;

    fn fixture(tickets: u32) -> (Server, ManualClock) {
        let clock = ManualClock::default();
        let config = Config::default()
            .with_tickets(tickets)
            .with_timeout(10)
            .with_allocation_batch(2);
        let coordinator = Coordinator::new(config, Arc::new(clock.clone()), Handle::current());
        let server = Server::new(ServerId::new(), Arc::new(Mailbox::new()), coordinator);
        (server, clock)
    }

    fn send(server: &mut Server, request: RecordingRequest) -> Response {
        let (request, mut pending) = request.into_parts();
        server.handle(ServerMsg::ProcessRequest(request));
        pending.try_take().expect("server answers synchronously").response
    }

    #[tokio::test]
    async fn reserve_pulls_a_batch_from_the_database() {
        let (mut server, _clock) = fixture(5);
        let customer = CustomerId::new();

        let response = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer));

        assert!(matches!(response, Response::Int(_)));
        assert_eq!(server.cache.len(), 1);
        assert_eq!(server.coordinator.database().num_available(), 3);
    }

    #[tokio::test]
    async fn second_reservation_is_rejected() {
        let (mut server, _clock) = fixture(5);
        let customer = CustomerId::new();

        send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer));
        let response = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer));

        assert_eq!(response, Response::from(SaleError::AlreadyReserved));
    }

    #[tokio::test]
    async fn buy_requires_the_reserved_ticket_id() {
        let (mut server, _clock) = fixture(1);
        let customer = CustomerId::new();
        let ticket = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer))
            .as_int()
            .unwrap();

        let missing = send(&mut server, RecordingRequest::post(RequestKind::BuyTicket, customer));
        assert_eq!(missing, Response::from(SaleError::MissingTicketArgument));

        let wrong = RecordingRequest::post(RequestKind::BuyTicket, customer).with_body((ticket + 1).to_string());
        assert_eq!(send(&mut server, wrong), Response::from(SaleError::TicketArgumentMismatch));

        let right = RecordingRequest::post(RequestKind::BuyTicket, customer).with_body(ticket.to_string());
        assert_eq!(send(&mut server, right), Response::Int(ticket));
        assert_eq!(server.coordinator.database().num_sold(), 1);
        assert!(server.reservations.is_empty());
    }

    #[tokio::test]
    async fn abort_without_reservation_fails() {
        let (mut server, _clock) = fixture(1);
        let request = RecordingRequest::post(RequestKind::AbortPurchase, CustomerId::new()).with_body("0");
        assert_eq!(send(&mut server, request), Response::from(SaleError::NoActiveReservation));
    }

    #[tokio::test]
    async fn sold_out_when_database_is_empty() {
        let (mut server, _clock) = fixture(1);
        send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, CustomerId::new()));
        let response = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, CustomerId::new()));
        assert_eq!(response, Response::SoldOut);
    }

    #[tokio::test]
    async fn expired_reservations_return_to_the_cache() {
        let (mut server, clock) = fixture(1);
        let customer = CustomerId::new();
        let ticket = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer))
            .as_int()
            .unwrap();

        clock.advance(Duration::seconds(11));

        let buy = RecordingRequest::post(RequestKind::BuyTicket, customer).with_body(ticket.to_string());
        assert_eq!(send(&mut server, buy), Response::from(SaleError::NoActiveReservation));
        assert_eq!(server.cache.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_flushes_idle_tickets_and_refuses_new_reservations() {
        let (mut server, _clock) = fixture(4);
        let holder = CustomerId::new();
        send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, holder));
        assert_eq!(server.cache.len(), 1);

        server.handle(ServerMsg::Shutdown);
        assert_eq!(server.state, ServerState::Draining);
        assert!(server.cache.is_empty());
        assert_eq!(server.coordinator.database().num_available(), 3);

        let response = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, CustomerId::new()));
        assert_eq!(response, Response::from(SaleError::ServerRetiring { reassigned: None }));
    }

    #[tokio::test]
    async fn draining_abort_goes_straight_to_the_database() {
        let (mut server, _clock) = fixture(1);
        let customer = CustomerId::new();
        let ticket = send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, customer))
            .as_int()
            .unwrap();

        server.handle(ServerMsg::Shutdown);
        let abort = RecordingRequest::post(RequestKind::AbortPurchase, customer).with_body(ticket.to_string());
        assert_eq!(send(&mut server, abort), Response::Int(ticket));

        assert_eq!(server.coordinator.database().num_available(), 1);
        assert!(server.ready_to_terminate());
        assert!(server.mailbox.is_closed());
    }

    #[tokio::test]
    async fn availability_adds_local_cache_to_estimate() {
        let (mut server, _clock) = fixture(10);
        send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, CustomerId::new()));
        server.handle(ServerMsg::TicketsAvailable(7));

        let response = send(&mut server, RecordingRequest::get(RequestKind::NumAvailableTickets, CustomerId::new()));
        assert_eq!(response, Response::Int(8));
    }

    #[tokio::test]
    async fn estimate_update_reports_back_to_the_estimator() {
        let (mut server, _clock) = fixture(10);
        send(&mut server, RecordingRequest::post(RequestKind::ReserveTicket, CustomerId::new()));
        server.handle(ServerMsg::TicketsAvailable(0));

        let report = server.coordinator.estimator_mailbox().try_recv();
        assert!(matches!(
            report,
            Some(EstimatorMsg::ServerAvailable { available: 1, .. })
        ));
    }

    #[tokio::test]
    async fn administrative_requests_are_not_served() {
        let (mut server, _clock) = fixture(1);
        let response = send(&mut server, RecordingRequest::get(RequestKind::GetServers, CustomerId::new()));
        assert_eq!(response, Response::from(SaleError::NotRoutable(RequestKind::GetServers)));
    }
}
