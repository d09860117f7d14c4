//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use palaver_shared::constants::DEFAULT_HTTP_PORT;

const DEV_JWT_SECRET: &str = "palaver-dev-secret";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: `./palaver.db`
    pub database_path: PathBuf,

    /// Shared secret used to verify access tokens (HS256).
    /// Env: `JWT_SECRET`
    /// Default: a fixed development secret (never use in production).
    pub jwt_secret: String,

    /// Interval between WebSocket keep-alive pings, in seconds.
    /// Env: `WS_PING_INTERVAL`
    /// Default: `30`
    pub ws_ping_interval_secs: u64,

    /// Maximum number of concurrent sessions (0 = unlimited).
    /// Env: `MAX_CONNECTIONS`
    /// Default: `0`
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./palaver.db"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            ws_ping_interval_secs: 30,
            max_connections: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using development secret");
            }
        }

        if let Ok(val) = std::env::var("WS_PING_INTERVAL") {
            if let Ok(n) = val.parse::<u64>() {
                config.ws_ping_interval_secs = n.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid WS_PING_INTERVAL, using default");
            }
        }

        if let Ok(val) = std::env::var("MAX_CONNECTIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_connections = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
