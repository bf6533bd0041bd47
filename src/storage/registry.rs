use std::sync::Arc;

use tracing::info;

use super::{ActiveBackend, LocalStorage, S3Storage, StorageError};

/// Every storage plugin compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Fs,
    S3,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Fs => "fs",
            BackendKind::S3 => "s3",
        }
    }

    /// Build the backend from its own environment settings.
    pub async fn connect(self) -> Result<ActiveBackend, StorageError> {
        info!("Initializing {} storage", self.name());
        let backend: ActiveBackend = match self {
            BackendKind::Fs => Arc::new(LocalStorage::from_env().await?),
            BackendKind::S3 => Arc::new(S3Storage::from_env().await?),
        };
        Ok(backend)
    }
}

/// Immutable name -> plugin table, built once at startup.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    entries: Vec<(&'static str, BackendKind)>,
}

impl BackendRegistry {
    pub fn builtin() -> Self {
        Self::from_kinds(&[BackendKind::Fs, BackendKind::S3])
    }

    pub fn from_kinds(kinds: &[BackendKind]) -> Self {
        Self {
            entries: kinds.iter().map(|kind| (kind.name(), *kind)).collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<BackendKind> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, kind)| *kind)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
