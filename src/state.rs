use std::sync::Arc;

use crate::{auth::PasswordGuard, config::ServerConfig, storage::ActiveBackend};

/// Central application state shared across all Axum handlers.
///
/// Built once, after the backend is resolved and before the listener is
/// bound; never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend every upload goes to.
    pub backend: ActiveBackend,

    /// Command-line configuration.
    pub config: Arc<ServerConfig>,

    pub password: PasswordGuard,
}

impl AppState {
    pub fn new(config: ServerConfig, backend: ActiveBackend) -> Self {
        Self {
            password: PasswordGuard::new(&config.password),
            backend,
            config: Arc::new(config),
        }
    }
}
