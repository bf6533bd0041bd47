use std::process::ExitCode;

use rikka::{ServerConfig, Shutdown, storage::BackendRegistry};
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::load();

    let level = config
        .as_ref()
        .map(ServerConfig::tracing_level)
        .unwrap_or(Level::INFO);
    init_tracing(level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = BackendRegistry::builtin();
    let shutdown = Shutdown::new();
    tokio::spawn(handle_interrupts(shutdown.clone()));

    match rikka::run(config, &registry, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over `--level` when set.
fn init_tracing(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Ctrl+C starts the shutdown; repeats while it is under way are ignored.
async fn handle_interrupts(shutdown: Shutdown) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if shutdown.trigger() {
            info!("Rikka have to go to sleep, see you tomorrow");
        } else {
            debug!("Shutdown already in progress");
        }
    }
}
