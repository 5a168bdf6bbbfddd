//! Server registry and elastic scaling.
//!
//! The coordinator is the shared context handed to every actor: it owns the
//! database, the estimator's mailbox, and the registry of servers. Membership
//! changes go through a single registry lock. The registry lock and the
//! database lock are never held together, and no lock is held while sending
//! to a mailbox.

use crate::database::Database;
use crate::estimator::EstimatorMsg;
use crate::mailbox::Mailbox;
use crate::metrics::RegistryMetrics;
use crate::server::{Server, ServerMsg, ServerSnapshot};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ticket_sale_core::environment::Clock;
use ticket_sale_core::{Config, DateTime, ServerId, Utc};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

type ServerMailbox = Arc<Mailbox<ServerMsg>>;

/// Server membership. Every id is in exactly one of the three sets.
#[derive(Debug, Default)]
struct Registry {
    /// Active servers in creation order; the oldest are retired first
    active: Vec<ServerId>,
    draining: HashSet<ServerId>,
    terminated: HashSet<ServerId>,
    /// Mailboxes of active and draining servers
    mailboxes: HashMap<ServerId, ServerMailbox>,
}

impl Registry {
    fn register(&mut self, id: ServerId, mailbox: ServerMailbox) {
        self.active.push(id);
        self.mailboxes.insert(id, mailbox);
    }
}

/// Registry and pool counts, as reported on the debug endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    /// Active server ids
    pub active: Vec<ServerId>,
    /// Number of draining servers
    pub draining: usize,
    /// Number of terminated servers
    pub terminated: usize,
    /// Tickets in the database pool
    pub database_available: usize,
    /// Tickets sold so far
    pub sold: u64,
}

/// Where every ticket is, as far as a quiescent system can tell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    /// Tickets minted at startup
    pub minted: u32,
    /// Tickets in the database pool
    pub database_available: usize,
    /// Tickets sold
    pub sold: u64,
    /// Per-server cache and reservation counts
    pub servers: Vec<ServerSnapshot>,
}

impl SystemSnapshot {
    /// Tickets accounted for across every collection.
    #[must_use]
    pub fn accounted(&self) -> u64 {
        let held: usize = self.servers.iter().map(|s| s.cached + s.reserved).sum();
        (self.database_available + held) as u64 + self.sold
    }

    /// Whether every minted ticket is accounted for exactly once.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.accounted() == u64::from(self.minted)
    }

    /// Live reservations across all servers
    #[must_use]
    pub fn reservations(&self) -> usize {
        self.servers.iter().map(|s| s.reserved).sum()
    }
}

/// Shared context of the sale system.
pub struct Coordinator {
    config: Config,
    clock: Arc<dyn Clock>,
    database: Database,
    estimator: Arc<Mailbox<EstimatorMsg>>,
    registry: Mutex<Registry>,
    runtime: Handle,
}

impl Coordinator {
    /// Create a coordinator with a freshly minted database and no servers.
    ///
    /// Server tasks are spawned on `runtime`.
    #[must_use]
    pub fn new(config: Config, clock: Arc<dyn Clock>, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            database: Database::new(config.tickets),
            config,
            clock,
            estimator: Arc::new(Mailbox::new()),
            registry: Mutex::new(Registry::default()),
            runtime,
        })
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration the system was launched with
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The ticket pool
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    /// Current time according to the injected clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The estimator's mailbox
    #[must_use]
    pub const fn estimator_mailbox(&self) -> &Arc<Mailbox<EstimatorMsg>> {
        &self.estimator
    }

    /// Create, register and start one server.
    pub fn create_server(self: &Arc<Self>) -> ServerId {
        let id = ServerId::new();
        let mailbox = Arc::new(Mailbox::new());
        self.registry().register(id, Arc::clone(&mailbox));
        self.spawn(id, mailbox);
        self.update_gauges();
        id
    }

    fn spawn(self: &Arc<Self>, id: ServerId, mailbox: ServerMailbox) {
        let server = Server::new(id, mailbox, Arc::clone(self));
        self.runtime.spawn(server.run());
        tracing::info!(server_id = %id, "Server created");
    }

    /// Move an active server to draining and ask it to shut down.
    ///
    /// Returns `false` if the server was not active. Does not wait for the
    /// server to terminate.
    pub fn remove_server(&self, id: ServerId) -> bool {
        let mailbox = {
            let mut registry = self.registry();
            let Some(position) = registry.active.iter().position(|active| *active == id) else {
                return false;
            };
            registry.active.remove(position);
            registry.draining.insert(id);
            registry.mailboxes.get(&id).cloned()
        };

        self.send_shutdown(id, mailbox);
        self.update_gauges();
        true
    }

    fn send_shutdown(&self, id: ServerId, mailbox: Option<ServerMailbox>) {
        let delivered = mailbox.is_some_and(|mailbox| mailbox.send_high(ServerMsg::Shutdown).is_ok());
        if delivered {
            tracing::info!(server_id = %id, "Server retiring");
        } else {
            tracing::warn!(server_id = %id, "Could not deliver shutdown, mailbox already closed");
        }
    }

    /// Create or retire servers until exactly `target` are active.
    ///
    /// The oldest servers are retired first. Returns the resulting number of
    /// active servers.
    pub fn scale(self: &Arc<Self>, target: usize) -> usize {
        let (created, retired, active) = {
            let mut registry = self.registry();

            let mut created = Vec::new();
            while registry.active.len() < target {
                let id = ServerId::new();
                let mailbox = Arc::new(Mailbox::new());
                registry.register(id, Arc::clone(&mailbox));
                created.push((id, mailbox));
            }

            let excess = registry.active.len().saturating_sub(target);
            let victims: Vec<ServerId> = registry.active.drain(..excess).collect();
            let retired: Vec<(ServerId, Option<ServerMailbox>)> = victims
                .into_iter()
                .map(|id| {
                    registry.draining.insert(id);
                    (id, registry.mailboxes.get(&id).cloned())
                })
                .collect();

            (created, retired, registry.active.len())
        };

        let (spawned, retiring) = (created.len(), retired.len());
        for (id, mailbox) in created {
            self.spawn(id, mailbox);
        }
        for (id, mailbox) in retired {
            self.send_shutdown(id, mailbox);
        }

        self.update_gauges();
        tracing::info!(target, active, spawned, retiring, "Scaled servers");
        active
    }

    /// Number of active servers
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.registry().active.len()
    }

    /// Active server ids in creation order
    #[must_use]
    pub fn active_server_ids(&self) -> Vec<ServerId> {
        self.registry().active.clone()
    }

    /// Pick an active server uniformly at random.
    #[must_use]
    pub fn pick_random_server(&self) -> Option<(ServerId, ServerMailbox)> {
        let registry = self.registry();
        let id = *registry.active.choose(&mut rand::thread_rng())?;
        let mailbox = registry.mailboxes.get(&id).cloned()?;
        Some((id, mailbox))
    }

    /// Mailbox of an active or draining server.
    #[must_use]
    pub fn mailbox(&self, id: ServerId) -> Option<ServerMailbox> {
        self.registry().mailboxes.get(&id).cloned()
    }

    /// Every active and draining server with its mailbox.
    #[must_use]
    pub fn live_servers(&self) -> Vec<(ServerId, ServerMailbox)> {
        self.registry()
            .mailboxes
            .iter()
            .map(|(id, mailbox)| (*id, Arc::clone(mailbox)))
            .collect()
    }

    /// Record that a draining server has exited its loop.
    ///
    /// # Panics
    ///
    /// Panics if the server was not draining.
    pub fn mark_terminated(&self, id: ServerId) {
        {
            let mut registry = self.registry();
            assert!(registry.draining.remove(&id), "server {id} terminated without draining");
            registry.mailboxes.remove(&id);
            registry.terminated.insert(id);
        }
        self.update_gauges();
    }

    /// Whether the server has terminated
    #[must_use]
    pub fn is_terminated(&self, id: ServerId) -> bool {
        self.registry().terminated.contains(&id)
    }

    /// Number of draining servers
    #[must_use]
    pub fn num_draining(&self) -> usize {
        self.registry().draining.len()
    }

    /// Registry and pool counts.
    #[must_use]
    pub fn registry_summary(&self) -> RegistrySummary {
        let (active, draining, terminated) = {
            let registry = self.registry();
            (
                registry.active.clone(),
                registry.draining.len(),
                registry.terminated.len(),
            )
        };
        RegistrySummary {
            active,
            draining,
            terminated,
            database_available: self.database.num_available(),
            sold: self.database.num_sold(),
        }
    }

    /// Ask every live server for its counts and combine them with the pool.
    ///
    /// Only meaningful as a conservation check while no tickets are in
    /// flight between collections.
    pub async fn audit(&self) -> SystemSnapshot {
        let mut servers = Vec::new();
        for (id, mailbox) in self.live_servers() {
            let (reply, answer) = oneshot::channel();
            if mailbox.send_high(ServerMsg::Snapshot(reply)).is_err() {
                tracing::debug!(server_id = %id, "Server terminated before audit");
                continue;
            }
            if let Ok(snapshot) = answer.await {
                servers.push(snapshot);
            }
        }

        SystemSnapshot {
            minted: self.database.minted(),
            database_available: self.database.num_available(),
            sold: self.database.num_sold(),
            servers,
        }
    }

    fn update_gauges(&self) {
        let (active, draining) = {
            let registry = self.registry();
            (registry.active.len(), registry.draining.len())
        };
        RegistryMetrics::record_sizes(active, draining);
    }

    /// Register an active server without starting its task.
    #[cfg(test)]
    pub(crate) fn register_detached(&self, id: ServerId) -> ServerMailbox {
        let mailbox = Arc::new(Mailbox::new());
        self.registry().register(id, Arc::clone(&mailbox));
        mailbox
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}
