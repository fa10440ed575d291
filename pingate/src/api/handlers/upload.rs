//! Multipart upload handlers.

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use bytes::BytesMut;
use tracing::{debug, instrument, warn};

use crate::{
    AppState,
    api::models::upload::{ErrorResponse, InvalidFileTypeResponse, InvalidFilesResponse, UploadForm, UploadMultipleForm},
    errors::{Error, Result},
    types::{BatchItem, UploadRequest, UploadResult},
    validation::DEFAULT_MEDIA_TYPE,
};

const SINGLE_FIELD: &str = "file";
const BATCH_FIELDS: &[&str] = &["files", "files[]"];

/// Only parts carrying a filename are files; a plain form value under the same name is ignored.
fn is_file_part(field: &Field<'_>, names: &[&str]) -> bool {
    field.file_name().is_some() && field.name().is_some_and(|name| names.contains(&name))
}

fn too_large() -> Error {
    Error::PayloadTooLarge {
        message: "File too large".to_string(),
    }
}

fn multipart_error(e: MultipartError) -> Error {
    // Raised when the request body as a whole exceeds the router's body limit
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    }
}

/// Buffer one file part, failing as soon as it grows past `max_file_size`.
async fn read_file(mut field: Field<'_>, max_file_size: u64) -> Result<UploadRequest> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let media_type = field.content_type().unwrap_or(DEFAULT_MEDIA_TYPE).to_string();

    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (buffer.len() + chunk.len()) as u64 > max_file_size {
            warn!(
                name = %original_name,
                max_file_size,
                "File size limit exceeded, aborting upload"
            );
            return Err(too_large());
        }
        buffer.extend_from_slice(&chunk);
    }

    debug!(name = %original_name, size = buffer.len(), media_type = %media_type, "Received file");
    Ok(UploadRequest::new(buffer.freeze(), original_name, media_type))
}

/// Upload a single file, store it and pin it.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    summary = "Upload file",
    description = "Stores one file on the IPFS node and pins it. `pinned` is false when the content was stored but every pin attempt failed.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResult),
        (status = 400, description = "No file or disallowed file type", body = InvalidFileTypeResponse),
        (status = 401, description = "Missing API key", body = ErrorResponse),
        (status = 403, description = "Invalid API key", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 429, description = "Too many uploads in progress", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("ApiKeyAuth" = []))
)]
#[instrument(skip_all, err)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResult>> {
    let _permit = state.limiters.acquire_upload().await?;
    let max_file_size = state.config.upload.max_file_size;

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if file.is_none() && is_file_part(&field, &[SINGLE_FIELD]) {
            file = Some(read_file(field, max_file_size).await?);
        }
    }

    let file = file.ok_or_else(|| Error::BadRequest {
        message: "No file uploaded".to_string(),
    })?;

    Ok(Json(state.uploads.upload_one(file).await?))
}

/// Upload several files in one request.
#[utoipa::path(
    post,
    path = "/upload-multiple",
    tag = "uploads",
    summary = "Upload files",
    description = "Stores several files concurrently. Every file is validated first; if any is rejected nothing is stored. Results are returned in upload order. A file the node failed to store is reported with an `error` field instead of a `cid`.",
    request_body(content = UploadMultipleForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file results in upload order", body = Vec<BatchItem>),
        (status = 400, description = "No files, too many files, or disallowed file types", body = InvalidFilesResponse),
        (status = 401, description = "Missing API key", body = ErrorResponse),
        (status = 403, description = "Invalid API key", body = ErrorResponse),
        (status = 413, description = "A file is too large", body = ErrorResponse),
        (status = 429, description = "Too many uploads in progress", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("ApiKeyAuth" = []))
)]
#[instrument(skip_all, err)]
pub async fn upload_multiple(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Vec<BatchItem>>> {
    let _permit = state.limiters.acquire_upload().await?;
    let max_file_size = state.config.upload.max_file_size;
    let max_files = state.config.upload.max_files;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !is_file_part(&field, BATCH_FIELDS) {
            continue;
        }
        if files.len() == max_files {
            return Err(Error::BadRequest {
                message: format!("Too many files (maximum {max_files})"),
            });
        }
        files.push(read_file(field, max_file_size).await?);
    }

    Ok(Json(state.uploads.upload_batch(files).await?))
}
