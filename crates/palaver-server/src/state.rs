//! Shared server state.

use std::sync::Arc;

use tokio::sync::Mutex;

use palaver_store::Database;

use crate::config::ServerConfig;
use crate::hub::Hub;

/// Everything the request handlers need, shared behind one `Arc`.
///
/// The database mutex is held across each mutate-then-emit sequence so that
/// events observed by a room reflect the order of the underlying writes.
pub struct AppState {
    pub config: ServerConfig,
    pub db: Mutex<Database>,
    pub hub: Hub,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Database) -> Arc<Self> {
        Arc::new(Self {
            config,
            db: Mutex::new(db),
            hub: Hub::new(),
        })
    }
}
