//! File download handler.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::{
    AppState,
    api::models::upload::ErrorResponse,
    errors::{Error, Result},
    retrieval,
    types::Cid,
};

/// Make a file name safe to embed in a quoted `Content-Disposition` parameter.
fn disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// Download a stored file.
#[utoipa::path(
    get,
    path = "/file/{cid}",
    tag = "files",
    summary = "Download file",
    description = "Returns the raw bytes of a stored file as an attachment. The content type is derived from the file extension.",
    params(
        ("cid" = String, Path, description = "Content identifier returned by an upload"),
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Malformed identifier, or the identifier is not a file", body = ErrorResponse),
        (status = 401, description = "Missing API key", body = ErrorResponse),
        (status = 403, description = "Invalid API key", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("ApiKeyAuth" = []))
)]
#[instrument(skip(state), err)]
pub async fn get_file(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Response> {
    let cid: Cid = cid.parse().map_err(|e: crate::types::InvalidCid| Error::BadRequest { message: e.to_string() })?;

    let file = retrieval::retrieve(state.store.as_ref(), &cid).await?;

    let headers = [
        (header::CONTENT_TYPE, file.media_type),
        (header::CONTENT_LENGTH, file.bytes.len().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", disposition_filename(&file.filename)),
        ),
    ];

    Ok((headers, file.bytes).into_response())
}
