//! A simulated customer.
//!
//! [`CustomerSession`] keeps one customer id and remembers the server stamped
//! on every answer, sending it along with the next request the same way an
//! HTTP client echoes the `X-Server-Id` header.

use crate::request::RecordingRequest;
use ticket_sale_core::{CustomerId, Method, RequestHandler, RequestKind, Response, ServerId};

/// Body of the error returned when a request is dropped unanswered.
pub const DROPPED: &str = "request was dropped without a response";

/// One customer talking to a [`RequestHandler`].
#[derive(Debug)]
pub struct CustomerSession<'a, H: RequestHandler + ?Sized> {
    handler: &'a H,
    customer: CustomerId,
    server: Option<ServerId>,
}

impl<'a, H: RequestHandler + ?Sized> CustomerSession<'a, H> {
    /// Start a session for a fresh customer.
    #[must_use]
    pub fn new(handler: &'a H) -> Self {
        Self::for_customer(handler, CustomerId::new())
    }

    /// Start a session for a known customer.
    #[must_use]
    pub const fn for_customer(handler: &'a H, customer: CustomerId) -> Self {
        Self {
            handler,
            customer,
            server: None,
        }
    }

    /// The customer id
    #[must_use]
    pub const fn customer(&self) -> CustomerId {
        self.customer
    }

    /// The server the last answer came from
    #[must_use]
    pub const fn server(&self) -> Option<ServerId> {
        self.server
    }

    /// Send an arbitrary request and wait for its answer.
    pub async fn send(&mut self, method: Method, kind: RequestKind, body: Option<String>) -> Response {
        let mut description = RecordingRequest::new(method, kind, self.customer);
        if let Some(server) = self.server {
            description = description.with_server(server);
        }
        if let Some(body) = body {
            description = description.with_body(body);
        }

        let (request, pending) = description.into_parts();
        self.handler.handle(request);

        match pending.wait().await {
            Some(recorded) => {
                if recorded.server_id.is_some() {
                    self.server = recorded.server_id;
                }
                recorded.response
            }
            None => Response::Error(DROPPED.to_string()),
        }
    }

    /// `POST /api/reserve_ticket`
    pub async fn reserve(&mut self) -> Response {
        self.send(Method::Post, RequestKind::ReserveTicket, None).await
    }

    /// `POST /api/buy_ticket`
    pub async fn buy(&mut self, ticket: u64) -> Response {
        self.send(Method::Post, RequestKind::BuyTicket, Some(ticket.to_string()))
            .await
    }

    /// `POST /api/abort_purchase`
    pub async fn abort(&mut self, ticket: u64) -> Response {
        self.send(Method::Post, RequestKind::AbortPurchase, Some(ticket.to_string()))
            .await
    }

    /// `GET /api/num_available_tickets`
    pub async fn num_available(&mut self) -> Response {
        self.send(Method::Get, RequestKind::NumAvailableTickets, None).await
    }

    /// `GET /api/admin/num_servers`
    pub async fn num_servers(&mut self) -> Response {
        self.send(Method::Get, RequestKind::NumServers, None).await
    }

    /// `POST /api/admin/num_servers`
    pub async fn set_num_servers(&mut self, servers: i64) -> Response {
        self.send(Method::Post, RequestKind::NumServers, Some(servers.to_string()))
            .await
    }

    /// `GET /api/admin/get_servers`
    pub async fn get_servers(&mut self) -> Response {
        self.send(Method::Get, RequestKind::GetServers, None).await
    }

    /// `GET /api/debug`
    pub async fn debug(&mut self) -> Response {
        self.send(Method::Get, RequestKind::Debug, None).await
    }
}
