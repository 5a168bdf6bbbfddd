//! In-memory [`Request`] implementation.
//!
//! Describe a request with [`RecordingRequest`], split it with
//! [`RecordingRequest::into_parts`], hand the boxed half to the system, and
//! await the answer on the [`PendingResponse`].

use ticket_sale_core::{CustomerId, Method, Request, RequestKind, Response, ServerId};
use tokio::sync::oneshot;

/// Description of a request to send.
#[derive(Clone, Debug)]
pub struct RecordingRequest {
    method: Method,
    kind: RequestKind,
    customer: CustomerId,
    server: Option<ServerId>,
    body: Option<String>,
}

impl RecordingRequest {
    /// A request with an explicit method
    #[must_use]
    pub const fn new(method: Method, kind: RequestKind, customer: CustomerId) -> Self {
        Self {
            method,
            kind,
            customer,
            server: None,
            body: None,
        }
    }

    /// A `GET` request
    #[must_use]
    pub const fn get(kind: RequestKind, customer: CustomerId) -> Self {
        Self::new(Method::Get, kind, customer)
    }

    /// A `POST` request
    #[must_use]
    pub const fn post(kind: RequestKind, customer: CustomerId) -> Self {
        Self::new(Method::Post, kind, customer)
    }

    /// Set the body (the integer argument as text)
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the previously assigned server
    #[must_use]
    pub const fn with_server(mut self, server: ServerId) -> Self {
        self.server = Some(server);
        self
    }

    /// Turn the description into a live request plus a handle on its answer.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn Request>, PendingResponse) {
        let (reply, receiver) = oneshot::channel();
        let exchange = Exchange {
            method: self.method,
            kind: self.kind,
            customer: self.customer,
            server: self.server,
            body: self.body,
            reply,
        };
        (Box::new(exchange), PendingResponse { receiver })
    }
}

/// What the system answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// The response
    pub response: Response,
    /// The server stamped on the response, if any
    pub server_id: Option<ServerId>,
    /// The customer the request was made for
    pub customer_id: CustomerId,
}

impl Recorded {
    /// The ticket id, when the response carries one
    #[must_use]
    pub const fn ticket_id(&self) -> Option<u64> {
        self.response.as_int()
    }
}

/// Receiving half of a request's answer.
#[derive(Debug)]
pub struct PendingResponse {
    receiver: oneshot::Receiver<Recorded>,
}

impl PendingResponse {
    /// Wait for the answer.
    ///
    /// Returns `None` when the request was dropped without being answered.
    pub async fn wait(self) -> Option<Recorded> {
        self.receiver.await.ok()
    }

    /// Take the answer if it has already arrived.
    pub fn try_take(&mut self) -> Option<Recorded> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct Exchange {
    method: Method,
    kind: RequestKind,
    customer: CustomerId,
    server: Option<ServerId>,
    body: Option<String>,
    reply: oneshot::Sender<Recorded>,
}

impl Request for Exchange {
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
        self.body.take().and_then(|body| body.trim().parse().ok())
    }

    fn respond(self: Box<Self>, response: Response) {
        let recorded = Recorded {
            response,
            server_id: self.server,
            customer_id: self.customer,
        };
        // The caller may have stopped waiting.
        let _ = self.reply.send(recorded);
    }
}
