//! HTTP request handlers.
//!
//! - [`upload`]: multipart decoding for `/upload` and `/upload-multiple`
//! - [`files`]: `/file/{cid}` downloads
//!
//! Handlers return [`crate::errors::Error`], which renders as `{"error": ...}` JSON with the
//! matching status code.

pub mod files;
pub mod upload;
