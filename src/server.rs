use std::{
    future::IntoFuture,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    error::ConfigError,
    handlers::{health_check, upload_file, upload_raw},
    state::AppState,
    storage::{ActiveBackend, BackendRegistry},
};

/// Room for multipart boundaries and the small text fields around the file.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// How long in-flight uploads get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-wide stop signal. The first `trigger` wins; later ones do nothing.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually started the shutdown.
    pub fn trigger(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

pub fn router(state: AppState) -> Router {
    let multipart_limit = usize::try_from(
        state
            .config
            .max_upload_size()
            .saturating_add(MULTIPART_OVERHEAD),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(multipart_limit)),
        )
        // The handler measures the body itself
        .route(
            "/upload/{filename}",
            put(upload_raw).layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Pick the configured backend out of the registry and bring it up.
pub async fn resolve_backend(
    config: &ServerConfig,
    registry: &BackendRegistry,
) -> Result<ActiveBackend, ConfigError> {
    debug!("Try to find plugin {}", config.backend);

    let kind = registry
        .resolve(&config.backend)
        .ok_or_else(|| ConfigError::UnknownBackend {
            name: config.backend.clone(),
            available: registry.names(),
        })?;
    debug!("Plugin {} found", kind.name());

    kind.connect()
        .await
        .map_err(|source| ConfigError::Backend {
            backend: kind.name(),
            source,
        })
}

/// Startup sequence: resolve backend, bind, serve until `shutdown` fires.
///
/// Nothing is bound unless the backend resolved and initialized.
pub async fn run(
    config: ServerConfig,
    registry: &BackendRegistry,
    shutdown: Shutdown,
) -> Result<(), ConfigError> {
    info!("Args bind = {}", config.bind);
    info!("Args port = {}", config.port);
    info!("Args password = {}", config.masked_password());
    info!("Args maxFileSize = {} MB", config.max_size_mb);
    info!("Args loggerLevel = {}", config.log_level);
    info!("Args plugin = {}", config.backend);

    info!("Check runtime environment");
    let backend = resolve_backend(&config, registry).await?;
    info!("All runtime environment check passed");

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ConfigError::Bind { addr, source })?;

    serve(listener, config, backend, shutdown).await
}

/// Serve on an already bound listener.
///
/// After shutdown is triggered the server stops accepting and in-flight
/// requests get `DRAIN_TIMEOUT` before they are dropped.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    backend: ActiveBackend,
    shutdown: Shutdown,
) -> Result<(), ConfigError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Server listening on {}", addr);
    }

    let app = router(AppState::new(config, backend));

    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.wait().await })
        .into_future();

    tokio::select! {
        result = server => result.map_err(ConfigError::Serve),
        _ = async {
            shutdown.wait().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            warn!("In-flight requests still running after {:?}, dropping them", DRAIN_TIMEOUT);
            Ok(())
        }
    }
}
