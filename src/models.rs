use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{ContentStream, StoredFile};

/// One inbound upload, alive only for the request that carries it.
pub struct UploadRequest<'a> {
    pub filename: String,
    pub content: ContentStream<'a>,
    /// Size the client declared, if any. Only a hint.
    pub size_hint: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub reference: String,
    pub filename: String,
    pub size: u64,
    pub backend: String,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadResponse {
    pub fn new(stored: StoredFile, backend: &str) -> Self {
        Self {
            reference: stored.reference.to_string(),
            filename: stored.filename,
            size: stored.size,
            backend: backend.to_string(),
            uploaded_at: Utc::now(),
        }
    }
}
