//! Ticket Sale Server
//!
//! Runs the sale system behind an HTTP listener.
//!
//! # Usage
//!
//! ```bash
//! TICKETS=1000 TIMEOUT=10 INITIAL_SERVERS=2 cargo run --bin server
//! ```
//!
//! `SLUG=1` serves the sequential reference handler instead. See
//! `ServerConfig` and `ticket_sale_core::Config` for all variables.

use anyhow::Context;
use std::sync::Arc;
use ticket_sale_core::Config;
use ticket_sale_runtime::{SaleSystem, Slug, launch};
use ticket_sale_runtime::metrics::MetricsServer;
use ticket_sale_web::{AppState, ServerConfig, build_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let server = ServerConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&server.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let sale = Config::from_env();
    tracing::info!(
        tickets = sale.tickets,
        timeout_secs = sale.timeout,
        initial_servers = sale.initial_servers,
        balancer_threads = server.balancer_threads,
        slug = server.slug,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(server.balancer_threads)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(server, sale))
}

async fn serve(server: ServerConfig, sale: Config) -> anyhow::Result<()> {
    let mut metrics = MetricsServer::new();
    metrics.start()?;

    let system: Arc<dyn SaleSystem> = if server.slug {
        Arc::new(Slug::new(&sale))
    } else {
        Arc::new(launch(sale)?)
    };
    tracing::info!(system = system.health().system, "Sale system started");
    let state = AppState::new(Arc::clone(&system)).with_metrics(Arc::new(metrics));

    let addr = server.addr().context("invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Ticket sale server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    tracing::info!("Shutting down gracefully...");
    system.shutdown();
    Ok(())
}
