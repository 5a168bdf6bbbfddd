//! Background availability estimator.
//!
//! Once per interval the estimator tells every live server how many tickets
//! are available outside of it: the database pool plus the idle counts the
//! other servers reported last round. Servers answer each broadcast with
//! their own idle count, which the estimator picks up on its next round.
//! The figure is stale by up to one interval.

use crate::coordinator::Coordinator;
use crate::mailbox::Mailbox;
use crate::metrics::EstimatorMetrics;
use crate::server::ServerMsg;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use ticket_sale_core::ServerId;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Messages understood by the estimator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimatorMsg {
    /// A server's idle ticket count
    ServerAvailable {
        /// Reporting server
        server: ServerId,
        /// Tickets in its local cache
        available: usize,
    },
}

/// The estimator actor.
pub struct Estimator {
    coordinator: Arc<Coordinator>,
    mailbox: Arc<Mailbox<EstimatorMsg>>,
    reports: HashMap<ServerId, usize>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Estimator {
    /// Create an estimator reading from the coordinator's estimator mailbox.
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            mailbox: Arc::clone(coordinator.estimator_mailbox()),
            interval: coordinator.config().estimator_interval(),
            coordinator,
            reports: HashMap::new(),
            shutdown,
        }
    }

    /// Run rounds until the shutdown signal fires.
    pub async fn run(mut self) {
        tracing::info!(interval_ms = self.interval.as_millis(), "Estimator started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.round(),
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.mailbox.close();
        tracing::info!("Estimator stopped");
    }

    /// One estimation round.
    fn round(&mut self) {
        let started = Instant::now();

        let servers = self.coordinator.live_servers();
        let pooled = self.coordinator.database().num_available();

        while let Some(EstimatorMsg::ServerAvailable { server, available }) = self.mailbox.try_recv() {
            self.reports.insert(server, available);
        }
        let live: HashSet<ServerId> = servers.iter().map(|(id, _)| *id).collect();
        self.reports.retain(|id, _| live.contains(id));

        let reported: usize = self.reports.values().sum();
        for (id, mailbox) in &servers {
            let own = self.reports.get(id).copied().unwrap_or(0);
            let estimate = pooled + reported - own;
            if mailbox.send_high(ServerMsg::TicketsAvailable(estimate)).is_err() {
                tracing::debug!(server_id = %id, "Server terminated before estimate");
            }
        }

        EstimatorMetrics::record_round(started.elapsed());
        tracing::trace!(servers = servers.len(), pooled, reported, "Estimator round");
    }
}
