//! HTTP implementation of the request boundary.
//!
//! An [`HttpExchange`] carries one HTTP request into the sale system and
//! sends the answer back to the waiting handler over a oneshot channel.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use std::str::FromStr;
use ticket_sale_core::{CustomerId, Method, Request, RequestKind, Response, ServerId};
use tokio::sync::oneshot;

/// Header carrying the customer id (always echoed back).
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";

/// Header carrying the sticky server id.
pub const SERVER_ID_HEADER: &str = "x-server-id";

/// One HTTP request in flight.
#[derive(Debug)]
pub struct HttpExchange {
    method: Method,
    kind: RequestKind,
    customer: CustomerId,
    server: Option<ServerId>,
    body: Option<Bytes>,
    reply: oneshot::Sender<Answer>,
}

/// The sale system's answer to an [`HttpExchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Response payload
    pub response: Response,
    /// Customer the request was made for
    pub customer: CustomerId,
    /// Server that handled the request, if any
    pub server: Option<ServerId>,
}

impl HttpExchange {
    /// Build an exchange from the parts of an HTTP request.
    ///
    /// A missing or malformed customer id is replaced by a fresh one. A
    /// malformed server id is ignored.
    #[must_use]
    pub fn new(method: Method, kind: RequestKind, headers: &HeaderMap, body: Bytes) -> (Self, oneshot::Receiver<Answer>) {
        let customer = match header::<CustomerId>(headers, CUSTOMER_ID_HEADER) {
            Some(Ok(customer)) => customer,
            Some(Err(raw)) => {
                let customer = CustomerId::new();
                tracing::warn!(header = %raw, %customer, "Invalid customer id, assigning a new one");
                customer
            }
            None => CustomerId::new(),
        };

        let server = match header::<ServerId>(headers, SERVER_ID_HEADER) {
            Some(Ok(server)) => Some(server),
            Some(Err(raw)) => {
                tracing::debug!(header = %raw, "Ignoring invalid server id");
                None
            }
            None => None,
        };

        let (reply, answer) = oneshot::channel();
        let exchange = Self {
            method,
            kind,
            customer,
            server,
            body: (!body.is_empty()).then_some(body),
            reply,
        };
        (exchange, answer)
    }
}

/// Parse a header; `Some(Err(raw))` when present but malformed.
fn header<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<Result<T, String>> {
    let value = headers.get(name)?;
    let text = value.to_str().unwrap_or_default();
    Some(text.parse().map_err(|_| String::from_utf8_lossy(value.as_bytes()).into_owned()))
}

impl Request for HttpExchange {
    fn method(&self) -> Method {
        self.method
    }

    fn kind(&self) -> RequestKind {
        self.kind
    }

    fn customer_id(&self) -> CustomerId {
        self.customer
    }

    fn server_id(&self) -> Option<ServerId> {
        self.server
    }

    fn set_server_id(&mut self, server_id: ServerId) {
        self.server = Some(server_id);
    }

    fn read_int(&mut self) -> Option<i64> {
        let body = self.body.take()?;
        std::str::from_utf8(&body).ok()?.trim().parse().ok()
    }

    fn respond(self: Box<Self>, response: Response) {
        let answer = Answer {
            response,
            customer: self.customer,
            server: self.server,
        };
        if self.reply.send(answer).is_err() {
            tracing::debug!(customer = %self.customer, "Client went away before the answer");
        }
    }
}

impl IntoResponse for Answer {
    fn into_response(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.response.status_code()).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::new();
        insert_id(&mut headers, CUSTOMER_ID_HEADER, &self.customer.to_string());
        if let Some(server) = self.server {
            insert_id(&mut headers, SERVER_ID_HEADER, &server.to_string());
        }
        (status, headers, self.response.body()).into_response()
    }
}

fn insert_id(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
