use clap::Parser;
use tracing::Level;
use validator::Validate;

use crate::error::ConfigError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Server settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "rikka", version, about = "A tiny file upload server with pluggable storage")]
pub struct ServerConfig {
    /// Bind ip address, use : for all address
    #[arg(long = "bind", default_value = "0.0.0.0")]
    pub bind: String,

    /// Server port
    #[arg(long = "port", default_value_t = 80)]
    pub port: u16,

    /// The password need provided when upload
    #[arg(long = "pwd", default_value = "rikka")]
    #[validate(length(min = 1, message = "password cannot be empty"))]
    pub password: String,

    /// Max file size by MB
    #[arg(long = "size", default_value_t = 5.0)]
    #[validate(range(exclusive_min = 0.0, message = "max size must be a positive number"))]
    pub max_size_mb: f64,

    /// Log level, from 0 (debug) to 3 (error)
    #[arg(long = "level", default_value_t = 1)]
    #[validate(range(max = 3, message = "log level must be between 0 and 3"))]
    pub log_level: u8,

    /// What plugin use to save file, selected from [fs s3]
    #[arg(long = "plugin", default_value = "fs")]
    pub backend: String,
}

impl ServerConfig {
    /// Load `.env` (if any), parse the command line and validate.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::parse().checked()
    }

    /// Validate an already-parsed configuration.
    pub fn checked(self) -> Result<Self, ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        // NaN and inf slip through range comparisons
        if !self.max_size_mb.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "max size must be a finite number, got {}",
                self.max_size_mb
            )));
        }
        Ok(self)
    }

    pub fn max_upload_size(&self) -> u64 {
        (self.max_size_mb * BYTES_PER_MB) as u64
    }

    /// `host:port` to bind; a bare `:` means every interface.
    pub fn socket_addr(&self) -> String {
        let host = match self.bind.as_str() {
            "" | ":" => "0.0.0.0",
            host => host.trim_end_matches(':'),
        };
        format!("{}:{}", host, self.port)
    }

    pub fn tracing_level(&self) -> Level {
        match self.log_level {
            0 => Level::DEBUG,
            1 => Level::INFO,
            2 => Level::WARN,
            _ => Level::ERROR,
        }
    }

    /// Password as it may appear in logs.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }
}
