//! API request and response models used for OpenAPI documentation.
//!
//! Response bodies that the service actually produces live in [`crate::types`]; the types here
//! describe the multipart request bodies and the error payloads.

pub mod upload;
