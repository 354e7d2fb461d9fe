//! Route handlers.
//!
//! [`root`] holds the echo routes and the file upload; [`example`] holds
//! the Example CRUD routes.

pub mod example;
pub mod root;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schema::{FieldType, ObjectSchema, Shape};

/// `{message}` acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
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

impl Shape for MessageResponse {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().required("message", FieldType::String)
    }
}

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}
