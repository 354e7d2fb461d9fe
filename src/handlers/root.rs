//! Root, echo, and file upload handlers.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::errors::ApiError;
use crate::metrics;
use crate::schema::{FieldType, ObjectSchema, Shape, Shaped, ValidatedJson, ValidatedPath};
use crate::storage::backend::FileMetadata;
use crate::AppState;

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// MIME type assumed for a part that declares none.
pub const DEFAULT_PART_CONTENT_TYPE: &str = "text/plain";

// -- Shapes -------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    pub root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl Shape for RootResponse {
    fn shape() -> ObjectSchema {
        ObjectSchema::new()
            .required("root", FieldType::Boolean)
            .optional("env", FieldType::String)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BasicResponse {
    pub root: bool,
}

impl Shape for BasicResponse {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().required("root", FieldType::Boolean)
    }
}

/// Path parameters of `/param/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamPath {
    #[serde(default)]
    pub id: Option<String>,
}

impl Shape for ParamPath {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().optional("id", FieldType::String)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParamResponse {
    pub id: String,
}

impl Shape for ParamResponse {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().required("id", FieldType::String)
    }
}

/// Body of `POST /body`; also its response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BodyMessage {
    /// The message to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Shape for BodyMessage {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().optional("message", FieldType::String)
    }
}

/// Documentation-only shape of the multipart upload form.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct FileUpload {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    pub url: String,
}

impl Shape for FileResponse {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().required("url", FieldType::String)
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /` -- `{root: true, env}`.
#[utoipa::path(
    get,
    path = "/",
    tag = "Root",
    summary = "Root",
    description = "Example of root route",
    responses(
        (status = 200, description = "Successful response", body = RootResponse)
    )
)]
pub async fn get_root(State(state): State<Arc<AppState>>) -> Shaped<RootResponse> {
    Shaped(RootResponse {
        root: true,
        env: state.config.server.environment.clone(),
    })
}

/// `GET /basic` -- `{root: true}`.
#[utoipa::path(
    get,
    path = "/basic",
    tag = "Root",
    summary = "Root",
    description = "Example of root route",
    responses(
        (status = 200, description = "Successful response", body = BasicResponse)
    )
)]
pub async fn get_basic() -> Shaped<BasicResponse> {
    Shaped(BasicResponse { root: true })
}

/// `GET /param/:id` -- echoes the path parameter.
#[utoipa::path(
    get,
    path = "/param/{id}",
    tag = "Root",
    summary = "Test",
    description = "Example of parameter route",
    params(
        ("id" = String, Path, description = "The id of the test"),
    ),
    responses(
        (status = 200, description = "Successful response", body = ParamResponse)
    )
)]
pub async fn get_param(ValidatedPath(params): ValidatedPath<ParamPath>) -> Shaped<ParamResponse> {
    Shaped(ParamResponse {
        id: params.id.unwrap_or_default(),
    })
}

/// `POST /body` -- echoes `message`.
#[utoipa::path(
    post,
    path = "/body",
    tag = "Root",
    summary = "Body",
    description = "Example of body route",
    request_body = BodyMessage,
    responses(
        (status = 200, description = "Successful response", body = BodyMessage),
        (status = 400, description = "Malformed body"),
        (status = 415, description = "Body is not JSON")
    )
)]
pub async fn post_body(ValidatedJson(body): ValidatedJson<BodyMessage>) -> Shaped<BodyMessage> {
    Shaped(body)
}

/// A fully buffered file part.
#[derive(Debug)]
pub(crate) struct FilePart {
    pub file_name: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Find the `file` field and drain it into memory.
///
/// Fields with other names are skipped.  A `file` field without a
/// filename is not a file upload.
pub(crate) async fn read_file_part(multipart: &mut Multipart) -> Result<FilePart, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        })?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }

        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(ApiError::BadRequest {
                    message: format!("body/{FILE_FIELD} must be a file"),
                })
            }
        };
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_PART_CONTENT_TYPE)
            .to_string();
        let content = field.bytes().await.map_err(|e| ApiError::BadRequest {
            message: format!("Failed to read file part: {e}"),
        })?;

        return Ok(FilePart {
            file_name,
            content_type,
            content,
        });
    }

    Err(ApiError::BadRequest {
        message: format!("body must have required property '{FILE_FIELD}'"),
    })
}

/// `POST /file` -- buffer the `file` part and hand it to object storage.
#[utoipa::path(
    post,
    path = "/file",
    tag = "Root",
    summary = "File",
    description = "Example of file upload route",
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Successful response", body = FileResponse),
        (status = 400, description = "No file part"),
        (status = 502, description = "Storage backend failure")
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Shaped<FileResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest {
        message: e.body_text(),
    })?;
    let part = read_file_part(&mut multipart).await?;
    let size = part.content.len();

    let url = match state
        .storage
        .upload_file(
            &part.file_name,
            part.content,
            FileMetadata::new(part.content_type),
        )
        .await
    {
        Ok(url) => url,
        Err(e) => {
            metrics::record_upload(false, size);
            return Err(ApiError::Upstream(e));
        }
    };

    metrics::record_upload(true, size);
    info!(file_name = %part.file_name, size, url = %url, "file uploaded");
    Ok(Shaped(FileResponse { url }))
}

// -- Tests --------------------------------------------------------------------
