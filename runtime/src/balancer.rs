//! Inbound request router.
//!
//! The balancer answers administrative requests itself and forwards the rest
//! to a server, preferring the one the customer was assigned before. It holds
//! no state of its own besides the shutdown signal, so any number of
//! transport threads may call [`RequestHandler::handle`] at once.

use crate::coordinator::Coordinator;
use crate::metrics::BalancerMetrics;
use crate::mailbox::Priority;
use crate::server::ServerMsg;
use std::sync::Arc;
use ticket_sale_core::{Method, Request, RequestHandler, RequestKind, Response, SaleError};
use tokio::sync::watch;

/// Entry point of the sale system.
#[derive(Debug)]
pub struct Balancer {
    coordinator: Arc<Coordinator>,
    shutdown: watch::Sender<bool>,
}

impl Balancer {
    /// Create a balancer over `coordinator`.
    ///
    /// `shutdown` is the signal the estimator listens on.
    #[must_use]
    pub const fn new(coordinator: Arc<Coordinator>, shutdown: watch::Sender<bool>) -> Self {
        Self { coordinator, shutdown }
    }

    /// The shared coordinator
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Stop the estimator. Servers keep serving.
    pub fn stop_estimator(&self) {
        self.shutdown.send_replace(true);
        tracing::info!("Balancer shut down estimator");
    }

    fn num_servers(&self, mut request: Box<dyn Request>) {
        if request.method() == Method::Get {
            request.respond_with_int(self.coordinator.num_active() as u64);
            return;
        }

        let Some(target) = request.read_int() else {
            request.respond(SaleError::MissingScaleArgument.into());
            return;
        };

        let active = match usize::try_from(target) {
            Ok(target) if target > 0 => self.coordinator.scale(target),
            _ => {
                tracing::warn!(error = %SaleError::InvalidScaleArgument(target), "Ignoring scale request");
                self.coordinator.num_active()
            }
        };
        request.respond_with_int(active as u64);
    }

    fn debug(&self, request: Box<dyn Request>) {
        match serde_json::to_string(&self.coordinator.registry_summary()) {
            Ok(summary) => request.respond_with_string(summary),
            Err(error) => request.respond_with_error(error.to_string()),
        }
    }

    /// Forward a request to a server.
    ///
    /// The sticky server is tried first. Otherwise random active servers are
    /// tried until one accepts.
    fn route(&self, mut request: Box<dyn Request>) {
        if let Some(mailbox) = request.server_id().and_then(|id| self.coordinator.mailbox(id)) {
            match mailbox.send_with(Priority::Low, request, ServerMsg::ProcessRequest) {
                Ok(()) => return,
                Err(closed) => {
                    BalancerMetrics::record_reroute();
                    request = closed.into_inner();
                }
            }
        }

        loop {
            let Some((id, mailbox)) = self.coordinator.pick_random_server() else {
                tracing::error!(
                    customer = %request.customer_id(),
                    kind = %request.kind(),
                    "No active servers to route to"
                );
                request.respond(SaleError::NoActiveServers.into());
                return;
            };

            request.set_server_id(id);
            match mailbox.send_with(Priority::Low, request, ServerMsg::ProcessRequest) {
                Ok(()) => return,
                Err(closed) => {
                    BalancerMetrics::record_reroute();
                    tracing::debug!(server_id = %id, "Mailbox closed, picking another server");
                    request = closed.into_inner();
                }
            }
        }
    }
}

impl RequestHandler for Balancer {
    fn handle(&self, request: Box<dyn Request>) {
        match request.kind() {
            RequestKind::NumServers => self.num_servers(request),
            RequestKind::GetServers => {
                request.respond_with_server_ids(self.coordinator.active_server_ids());
            }
            RequestKind::Debug => self.debug(request),
            RequestKind::NumAvailableTickets
            | RequestKind::ReserveTicket
            | RequestKind::BuyTicket
            | RequestKind::AbortPurchase => self.route(request),
        }
    }
}

impl Drop for Balancer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
