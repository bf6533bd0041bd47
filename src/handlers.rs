use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
};
use futures::TryStreamExt;
use tracing::{error, info, warn};

use crate::{
    error::AppError,
    models::{UploadRequest, UploadResponse},
    state::AppState,
    storage::StorageError,
    utils::{declared_too_large, limit_stream},
};

/// Multipart field carrying the shared password.
pub const PASSWORD_FIELD: &str = "password";
/// Multipart field carrying the file itself.
pub const FILE_FIELD: &str = "uploadFile";
/// Optional multipart field overriding the part's own filename.
pub const FILENAME_FIELD: &str = "filename";
/// Header carrying the password on raw-body uploads.
pub const PASSWORD_HEADER: &str = "x-rikka-password";

/// Upload a file using multipart/form-data.
///
/// Fields are read in order and the file part is streamed straight to the
/// backend, so `password` (and `filename`, if used) must come before
/// `uploadFile`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let limit = state.config.max_upload_size();
    let mut authenticated = false;
    let mut custom_filename: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Error parsing multipart: {}", e);
        AppError::from(multipart_failure(e, limit))
    })? {
        match field.name().unwrap_or("") {
            PASSWORD_FIELD => {
                let supplied = field
                    .text()
                    .await
                    .map_err(|e| AppError::from(multipart_failure(e, limit)))?;
                if !state.password.matches(&supplied) {
                    warn!("Upload rejected: wrong password");
                    return Err(AppError::Forbidden("Wrong password".into()));
                }
                authenticated = true;
            }
            FILENAME_FIELD => {
                let name = field
                    .text()
                    .await
                    .map_err(|e| AppError::from(multipart_failure(e, limit)))?;
                if !name.is_empty() {
                    custom_filename = Some(name);
                }
            }
            FILE_FIELD => {
                if !authenticated {
                    warn!("Upload rejected: file part arrived before the password");
                    return Err(AppError::Forbidden(
                        "Password must be sent before the file".into(),
                    ));
                }

                let filename = custom_filename
                    .take()
                    .or_else(|| field.file_name().map(str::to_string))
                    .ok_or_else(|| AppError::BadRequest("No filename provided".into()))?;

                let content = field.map_err(move |e| multipart_failure(e, limit));
                return store_upload(
                    &state,
                    UploadRequest {
                        filename,
                        content: Box::pin(content),
                        size_hint: None,
                    },
                )
                .await;
            }
            _ => {}
        }
    }

    if !authenticated {
        warn!("Upload rejected: no password supplied");
        return Err(AppError::Forbidden("Wrong password".into()));
    }
    Err(AppError::BadRequest("No file provided".into()))
}

/// Upload a file sent as the raw request body, password in `X-Rikka-Password`.
pub async fn upload_raw(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, AppError> {
    let supplied = headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !state.password.matches(supplied) {
        warn!("Upload rejected: wrong password");
        return Err(AppError::Forbidden("Wrong password".into()));
    }

    let limit = state.config.max_upload_size();
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_too_large(declared, limit) {
        return Err(StorageError::LimitExceeded { limit }.into());
    }

    let content = body
        .into_data_stream()
        .map_err(|e| StorageError::Body(format!("Failed to read the body: {e}")));

    store_upload(
        &state,
        UploadRequest {
            filename,
            content: Box::pin(content),
            size_hint: declared,
        },
    )
    .await
}

/// Shared tail of both upload routes: enforce the measured size limit while
/// streaming into the active backend.
async fn store_upload(
    state: &AppState,
    request: UploadRequest<'_>,
) -> Result<Json<UploadResponse>, AppError> {
    let limit = state.config.max_upload_size();
    let content = limit_stream(request.content, limit);

    let stored = state
        .backend
        .store(&request.filename, content, request.size_hint)
        .await
        .map_err(|e| {
            match &e {
                StorageError::LimitExceeded { .. } => {
                    warn!("File {} exceeds maximum limit of {} bytes", request.filename, limit)
                }
                other => error!("Error uploading file {}: {}", request.filename, other),
            }
            AppError::from(e)
        })?;

    info!(
        "File uploaded: {} -> {} ({} bytes)",
        request.filename, stored.reference, stored.size
    );

    Ok(Json(UploadResponse::new(stored, state.backend.name())))
}

fn multipart_failure(e: MultipartError, limit: u64) -> StorageError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StorageError::LimitExceeded { limit }
    } else {
        StorageError::Body(format!("Failed to parse multipart form: {}", e.body_text()))
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
