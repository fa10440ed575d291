//! `x-api-key` header authentication.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::trace;

use crate::{AppState, errors::Error};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths reachable without a key.
const PUBLIC_PATHS: &[&str] = &["/healthz"];

/// Reject requests that do not carry one of the configured API keys.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    let auth = &state.config.auth;
    if !auth.enabled || PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let Some(key) = request.headers().get(API_KEY_HEADER) else {
        return Err(Error::Unauthenticated {
            message: Some("API key is required".to_string()),
        });
    };

    let valid = key
        .to_str()
        .map(|key| auth.api_keys.iter().any(|allowed| allowed == key))
        .unwrap_or(false);
    if !valid {
        return Err(Error::Forbidden {
            message: "Invalid API key".to_string(),
        });
    }

    trace!("API key accepted");
    Ok(next.run(request).await)
}
