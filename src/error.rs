//! API error taxonomy and its mapping to HTTP responses.
//!
//! Every handler returns `ApiResult<T>`; failures are converted to a status
//! code plus a JSON body at the boundary. Error detail text is included in
//! the body on purpose - this is a personal-site backend, not a hardened
//! service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("filesystem error")]
    Filesystem(#[from] std::io::Error),
}

/// Wire shape for all error responses: a human-readable message plus an
/// optional internal detail string.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Filesystem(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::NotFound(msg) | ApiError::Validation(msg) | ApiError::Conflict(msg) => {
                ErrorBody {
                    message: msg.clone(),
                    error: None,
                }
            }
            ApiError::Database(e) => {
                tracing::error!("database error: {}", e);
                ErrorBody {
                    message: "Database error".to_string(),
                    error: Some(e.to_string()),
                }
            }
            ApiError::Filesystem(e) => {
                tracing::error!("filesystem error: {}", e);
                ErrorBody {
                    message: "Filesystem error".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Database(sqlx::Error::PoolClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_error_body_carries_detail() {
        let response = ApiError::Database(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_body_has_no_detail_field() {
        let body = ErrorBody {
            message: "Title is required".into(),
            error: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("Title is required"));
        assert!(!json.contains("\"error\""));
    }
}
