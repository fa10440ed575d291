//! HTTP API: route handlers and documentation-only models.
//!
//! - **[`handlers`]**: Axum route handlers for uploads and retrieval
//! - **[`models`]**: Request/response shapes referenced by the OpenAPI document
//!
//! Routes:
//!
//! - `POST /upload`: single file, multipart field `file`
//! - `POST /upload-multiple`: several files, multipart field `files`
//! - `GET /file/{cid}`: download by content identifier
//!
//! API documentation is served at `/docs`, the raw document at `/openapi.json`.

pub mod handlers;
pub mod models;
