//! HTTP error types.
//!
//! Every variant maps to a status code and renders the same JSON body
//! shape: `{"statusCode": .., "error": .., "message": ..}`.  Handlers
//! return `Err(ApiError::..)` and the dispatcher does the rest.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::schema::SchemaViolation;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Failure classes surfaced to clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body is not JSON where JSON is required.
    #[error("Unsupported Media Type")]
    UnsupportedMediaType,

    /// Malformed input that failed before schema checks (bad JSON, bad multipart).
    #[error("{message}")]
    BadRequest { message: String },

    /// Input did not match the declared route shape.
    #[error(transparent)]
    Validation(#[from] SchemaViolation),

    /// No record exists with the given id.
    #[error("Example '{id}' not found")]
    NotFound { id: String },

    /// The object storage backend rejected or failed the call.
    #[error("Upstream storage failure: {0}")]
    Upstream(anyhow::Error),

    /// Catch-all for unexpected internal errors.
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire form of an error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            let detail = match &self {
                ApiError::Upstream(e) | ApiError::Internal(e) => format!("{e:#}"),
                other => other.to_string(),
            };
            error!(status = status.as_u16(), error = %detail, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

// -- Tests --------------------------------------------------------------------
