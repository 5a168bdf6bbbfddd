//! The request boundary between the transport layer and the sale system.
//!
//! The transport (HTTP or a test harness) implements [`Request`]. The system
//! consumes a boxed request, possibly moves it across actors, and finally
//! answers it exactly once through [`Request::respond`]. Because `respond`
//! takes `self: Box<Self>`, a request cannot be answered twice.

use crate::ids::{CustomerId, ServerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the request only reads or may mutate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Read-only
    Get,
    /// May have side effects (scaling, reserving, ...)
    Post,
}

impl Method {
    /// Parse an HTTP method name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

/// What the client is asking for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Query (GET) or set (POST) the number of active servers
    NumServers,
    /// List the active servers
    GetServers,
    /// Approximate number of tickets still available
    NumAvailableTickets,
    /// Reserve a ticket
    ReserveTicket,
    /// Buy the reserved ticket
    BuyTicket,
    /// Give the reserved ticket back
    AbortPurchase,
    /// Free-form diagnostics
    Debug,
}

impl RequestKind {
    /// Map a request path onto its kind.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/api/admin/num_servers" => Some(Self::NumServers),
            "/api/admin/get_servers" => Some(Self::GetServers),
            "/api/num_available_tickets" => Some(Self::NumAvailableTickets),
            "/api/reserve_ticket" => Some(Self::ReserveTicket),
            "/api/buy_ticket" => Some(Self::BuyTicket),
            "/api/abort_purchase" => Some(Self::AbortPurchase),
            p if p.starts_with("/api/debug") => Some(Self::Debug),
            _ => None,
        }
    }

    /// Kinds answered by the balancer itself rather than a server.
    #[must_use]
    pub const fn is_administrative(self) -> bool {
        matches!(self, Self::NumServers | Self::GetServers | Self::Debug)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NumServers => "NUM_SERVERS",
            Self::GetServers => "GET_SERVERS",
            Self::NumAvailableTickets => "NUM_AVAILABLE_TICKETS",
            Self::ReserveTicket => "RESERVE_TICKET",
            Self::BuyTicket => "BUY_TICKET",
            Self::AbortPurchase => "ABORT_PURCHASE",
            Self::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// The answer to a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// An integer (ticket id, server count, availability estimate)
    Int(u64),
    /// Free-form text
    Text(String),
    /// The reservation could not be served: no tickets left
    SoldOut,
    /// A list of server ids
    ServerIds(Vec<ServerId>),
    /// A 400-class client error with a message
    Error(String),
}

impl Response {
    /// HTTP status code for this response.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Error(_) => 400,
            _ => 200,
        }
    }

    /// Body text as the client sees it.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Text(text) | Self::Error(text) => text.clone(),
            Self::SoldOut => "SOLD OUT".to_string(),
            Self::ServerIds(ids) => ids.iter().map(|id| format!("{id}\n")).collect(),
        }
    }

    /// Whether this is an error response
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The integer payload, if any
    #[must_use]
    pub const fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// A request handed over by the transport layer.
///
/// Implementations must be `Send`: a request is created on a transport thread
/// and answered from whichever server task ends up handling it.
pub trait Request: Send + fmt::Debug {
    /// The request method
    fn method(&self) -> Method;

    /// The request kind
    fn kind(&self) -> RequestKind;

    /// The requesting customer
    fn customer_id(&self) -> CustomerId;

    /// The server the client was previously assigned, if any
    fn server_id(&self) -> Option<ServerId>;

    /// Stamp the response with the server that handles the request.
    fn set_server_id(&mut self, server_id: ServerId);

    /// Read the integer argument from the request body.
    ///
    /// The body is consumed: only the first call can yield a value. Returns
    /// `None` when the body is missing or does not parse.
    fn read_int(&mut self) -> Option<i64>;

    /// Answer the request.
    fn respond(self: Box<Self>, response: Response);

    /// Answer with an integer.
    fn respond_with_int(self: Box<Self>, value: u64) {
        self.respond(Response::Int(value));
    }

    /// Answer with a string.
    fn respond_with_string(self: Box<Self>, text: String) {
        self.respond(Response::Text(text));
    }

    /// Answer with the sold-out marker.
    fn respond_with_sold_out(self: Box<Self>) {
        self.respond(Response::SoldOut);
    }

    /// Answer with a list of server ids.
    fn respond_with_server_ids(self: Box<Self>, ids: Vec<ServerId>) {
        self.respond(Response::ServerIds(ids));
    }

    /// Answer with a 400-class error.
    fn respond_with_error(self: Box<Self>, message: String) {
        self.respond(Response::Error(message));
    }
}

/// The single entry point the transport layer calls.
///
/// Invoked concurrently from any number of threads; implementations must not
/// block beyond short critical sections.
pub trait RequestHandler: Send + Sync {
    /// Take ownership of a request and make sure it is eventually answered.
    fn handle(&self, request: Box<dyn Request>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_kinds() {
        assert_eq!(RequestKind::from_path("/api/reserve_ticket"), Some(RequestKind::ReserveTicket));
        assert_eq!(RequestKind::from_path("/api/admin/num_servers"), Some(RequestKind::NumServers));
        assert_eq!(RequestKind::from_path("/api/debug/anything"), Some(RequestKind::Debug));
        assert_eq!(RequestKind::from_path("/api/unknown"), None);
    }

    #[test]
    fn only_admin_kinds_stay_in_the_balancer() {
        assert!(RequestKind::GetServers.is_administrative());
        assert!(!RequestKind::BuyTicket.is_administrative());
    }

    #[test]
    fn server_id_lists_are_newline_terminated() {
        let a = ServerId::new();
        let b = ServerId::new();
        let body = Response::ServerIds(vec![a, b]).body();
        assert_eq!(body, format!("{a}\n{b}\n"));
    }

    #[test]
    fn errors_are_bad_requests() {
        assert_eq!(Response::Error("nope".into()).status_code(), 400);
        assert_eq!(Response::SoldOut.status_code(), 200);
        assert_eq!(Response::SoldOut.body(), "SOLD OUT");
    }
}
