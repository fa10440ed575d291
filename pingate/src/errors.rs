use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No credential provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Credential provided but not accepted
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// A single upload failed the file type allow-list
    #[error("Invalid file type")]
    InvalidFileType { allowed_types: Vec<String> },

    /// One or more files of a batch upload failed the file type allow-list
    #[error("Invalid file types: {}", invalid_files.join(", "))]
    InvalidFiles {
        allowed_types: Vec<String>,
        invalid_files: Vec<String>,
    },

    /// Upload exceeds the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Upload admission queue is full
    #[error("{message}")]
    TooManyRequests { message: String },

    /// Requested content not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Requested identifier refers to a directory or other non-file node
    #[error("{cid} is not a file")]
    NotAFile { cid: String },

    /// Content store call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::InvalidFileType { .. } | Error::InvalidFiles { .. } | Error::NotAFile { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Store(_) | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone(),
            Error::BadRequest { message } => message.clone(),
            Error::InvalidFileType { .. } => "Invalid file type".to_string(),
            Error::InvalidFiles { .. } => "Invalid file types".to_string(),
            Error::PayloadTooLarge { message } => message.clone(),
            Error::TooManyRequests { message } => message.clone(),
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::NotAFile { .. } => "Requested CID is not a file".to_string(),
            Error::Store(_) | Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Store(_) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::TooManyRequests { .. } => {
                tracing::warn!("Upload rejected: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let message = self.user_message();

        let body = match &self {
            Error::InvalidFileType { allowed_types } => json!({
                "error": message,
                "allowedTypes": allowed_types,
            }),
            Error::InvalidFiles {
                allowed_types,
                invalid_files,
            } => json!({
                "error": message,
                "allowedTypes": allowed_types,
                "invalidFiles": invalid_files,
            }),
            _ => json!({ "error": message }),
        };

        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak_details() {
        let err = Error::Store(StoreError::Unavailable("connection refused to 10.0.0.7:5001".to_string()));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "Internal server error"}));
    }

    #[tokio::test]
    async fn test_invalid_files_body_lists_names() {
        let err = Error::InvalidFiles {
            allowed_types: vec!["png".to_string()],
            invalid_files: vec!["virus.exe".to_string()],
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "Invalid file types",
                "allowedTypes": ["png"],
                "invalidFiles": ["virus.exe"],
            })
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthenticated { message: None }.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Forbidden {
                message: "Invalid API key".to_string()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::PayloadTooLarge {
                message: "File too large".to_string()
            }
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::NotFound {
                resource: "File".to_string(),
                id: "bafy".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::NotAFile { cid: "bafy".to_string() }.status_code(), StatusCode::BAD_REQUEST);
    }
}
