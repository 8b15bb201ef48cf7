/**
 * Routes Module
 * API route handlers
 */

pub mod health;
pub mod portfolio;
pub mod posts;

use axum::http::{Method, StatusCode, Uri};
use serde::Serialize;

/// Success response carrying only a human-readable message
/// (update and delete endpoints).
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fallback for unmatched routes: 404 echoing method and path.
pub async fn not_found(method: Method, uri: Uri) -> (StatusCode, String) {
    tracing::debug!(method = %method, uri = %uri, "no route matched");
    (StatusCode::NOT_FOUND, format!("Cannot {} {}", method, uri))
}
