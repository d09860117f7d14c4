//! # palaver-server
//!
//! Real-time messaging and presence server.
//!
//! This binary provides:
//! - **Authenticated WebSocket gateway** (axum) for the event protocol
//! - **Presence registry** with per-user session counting
//! - **Conversation rooms** with membership-gated fan-out
//! - **Message lifecycle**: send, receipts, reactions, edits, deletes
//! - **Call signaling relay** for WebRTC offer/answer/candidate exchange

use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_server::{gateway, AppState, ServerConfig};
use palaver_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,palaver_server=debug")),
        )
        .init();

    info!("Starting Palaver server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database (runs pending migrations)
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database ready");

    // -----------------------------------------------------------------------
    // 4. Build shared state and the HTTP router
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let state = AppState::new(config, db);
    let router = gateway::build_router(state);

    // -----------------------------------------------------------------------
    // 5. Run the server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "Listening");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
