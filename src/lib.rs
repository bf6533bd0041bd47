//! Rikka: a small password-protected upload server with pluggable storage.
//!
//! One storage backend is picked by name at startup and every upload is
//! streamed to it, with the password and size limit checked on the way in.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod state;
pub mod storage;
pub mod utils;

pub use config::ServerConfig;
pub use error::{AppError, ConfigError};
pub use server::{Shutdown, resolve_backend, router, run, serve};
pub use state::AppState;
