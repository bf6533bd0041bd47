// Submodules for local file system storage and S3 storage
mod filename;
mod local;
mod registry;
mod s3;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

pub use filename::{FilenameError, validate_filename, validate_object_key};
pub use local::LocalStorage;
pub use registry::{BackendKind, BackendRegistry};
pub use s3::{S3Settings, S3Storage};

// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(#[from] FilenameError), // Rejected before anything is written

    #[error("Upload exceeds the limit of {limit} bytes")]
    LimitExceeded { limit: u64 },

    #[error("Body Error: {0}")]
    Body(String), // The client stream broke off mid-upload

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error), // Disk full, permission denied, ...

    #[error("Backend unavailable: {0}")]
    Unavailable(String), // Remote service unreachable or refused the write

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Body of an upload as it arrives from the client.
///
/// An `Err` item aborts the store: the backend discards whatever it has
/// written so far and returns that error unchanged.
pub type ContentStream<'a> = BoxStream<'a, Result<Bytes, StorageError>>;

/// Identifier handed back to the client for a stored file (a path or URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StoredFileReference(String);

impl StoredFileReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredFileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a stored upload looks like to the handler.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub reference: StoredFileReference,
    /// Name the backend finally used, which may differ after collision handling.
    pub filename: String,
    pub size: u64,
}

// Async storage trait every plugin implements
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Registry name of the backend. Used for lookup and logging only.
    fn name(&self) -> &'static str;

    /// Persist `content` under `filename`.
    ///
    /// The file must be durably readable through the returned reference
    /// when this resolves to `Ok`. On error nothing may be left behind.
    async fn store(
        &self,
        filename: &str,
        content: ContentStream<'_>,
        size_hint: Option<u64>,
    ) -> Result<StoredFile, StorageError>;
}

/// The single backend chosen at startup and shared by every request.
pub type ActiveBackend = Arc<dyn StorageBackend>;
