//! HTTP server configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The sale system itself is configured through [`ticket_sale_core::Config`].

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

/// Default `RUST_LOG` filter
pub const DEFAULT_LOG_FILTER: &str = "info,ticket_sale=debug,tower_http=info";

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Worker threads handling connections and calling the balancer
    pub balancer_threads: usize,
    /// Tracing filter directives
    pub log_filter: String,
    /// Serve with the sequential slug instead of the elastic system
    pub slug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8585,
            balancer_threads: 64,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            slug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Falls back to defaults if environment variables are not set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparsable values fall back to defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            balancer_threads: lookup("BALANCER_THREADS")
                .and_then(|v| v.parse().ok())
                .filter(|threads| *threads > 0)
                .unwrap_or(defaults.balancer_threads),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
            slug: lookup("SLUG").map_or(defaults.slug, |v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
