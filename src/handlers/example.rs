//! Example record CRUD handlers.
//!
//! Each handler performs exactly one record store call.  Create answers
//! with a fixed message and exposes the new id only through `Location`.

use axum::extract::State;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::MessageResponse;
use crate::errors::ApiError;
use crate::metrics;
use crate::records::store::{Example, ExampleRecord};
use crate::schema::{FieldType, ObjectSchema, Shape, Shaped, ValidatedJson, ValidatedPath};
use crate::AppState;

fn address_shape() -> ObjectSchema {
    ObjectSchema::new()
        .optional("street", FieldType::String)
        .optional("city", FieldType::String)
        .optional("state", FieldType::String)
        .optional("zip", FieldType::Number)
}

impl Shape for Example {
    fn shape() -> ObjectSchema {
        ObjectSchema::new()
            .required("name", FieldType::String)
            .optional("age", FieldType::Number)
            .required("email", FieldType::String)
            .optional("address", FieldType::Object(address_shape()))
    }
}

impl Shape for ExampleRecord {
    fn shape() -> ObjectSchema {
        ObjectSchema::new()
            .required("id", FieldType::String)
            .required("name", FieldType::String)
            .optional("age", FieldType::Number)
            .required("email", FieldType::String)
            .optional("address", FieldType::Object(address_shape()))
    }
}

/// Path parameters of `/example/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExampleId {
    pub id: String,
}

impl Shape for ExampleId {
    fn shape() -> ObjectSchema {
        ObjectSchema::new().required("id", FieldType::String)
    }
}

/// Tag a record store result for metrics before propagating it.
fn track<T>(operation: &'static str, result: anyhow::Result<T>) -> anyhow::Result<T> {
    metrics::record_operation(operation, if result.is_ok() { "ok" } else { "error" });
    result
}

/// `POST /example/` -- create an Example.
#[utoipa::path(
    post,
    path = "/example/",
    tag = "Example",
    summary = "Create an example",
    description = "Create an example",
    request_body = Example,
    responses(
        (status = 200, description = "Successful response", body = MessageResponse,
            headers(("location" = String, description = "Path of the created example"))),
        (status = 400, description = "Missing or mistyped fields"),
        (status = 500, description = "Record store failure")
    )
)]
pub async fn create_example(
    State(state): State<Arc<AppState>>,
    ValidatedJson(example): ValidatedJson<Example>,
) -> Result<impl IntoResponse, ApiError> {
    let record = track("create", state.records.create(example).await)?;
    info!(id = %record.id, "example created");
    Ok((
        [(LOCATION, format!("/example/{}", record.id))],
        Shaped(MessageResponse::new("Example created")),
    ))
}

/// `GET /example/:id` -- fetch an Example.
#[utoipa::path(
    get,
    path = "/example/{id}",
    tag = "Example",
    summary = "Get an example",
    params(("id" = String, Path, description = "Example id")),
    responses(
        (status = 200, description = "Successful response", body = ExampleRecord),
        (status = 404, description = "No such example")
    )
)]
pub async fn get_example(
    State(state): State<Arc<AppState>>,
    ValidatedPath(ExampleId { id }): ValidatedPath<ExampleId>,
) -> Result<Shaped<ExampleRecord>, ApiError> {
    track("get", state.records.get(&id).await)?
        .map(Shaped)
        .ok_or(ApiError::NotFound { id })
}

/// `PUT /example/:id` -- replace an Example's fields.
#[utoipa::path(
    put,
    path = "/example/{id}",
    tag = "Example",
    summary = "Update an example",
    params(("id" = String, Path, description = "Example id")),
    request_body = Example,
    responses(
        (status = 200, description = "Successful response", body = MessageResponse),
        (status = 400, description = "Missing or mistyped fields"),
        (status = 404, description = "No such example")
    )
)]
pub async fn update_example(
    State(state): State<Arc<AppState>>,
    ValidatedPath(ExampleId { id }): ValidatedPath<ExampleId>,
    ValidatedJson(example): ValidatedJson<Example>,
) -> Result<Shaped<MessageResponse>, ApiError> {
    let record = ExampleRecord::from_example(id.clone(), example);
    if !track("update", state.records.update(record).await)? {
        return Err(ApiError::NotFound { id });
    }
    info!(id = %id, "example updated");
    Ok(Shaped(MessageResponse::new("Example updated")))
}

/// `DELETE /example/:id` -- delete an Example.
#[utoipa::path(
    delete,
    path = "/example/{id}",
    tag = "Example",
    summary = "Delete an example",
    params(("id" = String, Path, description = "Example id")),
    responses(
        (status = 200, description = "Successful response", body = MessageResponse),
        (status = 404, description = "No such example")
    )
)]
pub async fn delete_example(
    State(state): State<Arc<AppState>>,
    ValidatedPath(ExampleId { id }): ValidatedPath<ExampleId>,
) -> Result<Shaped<MessageResponse>, ApiError> {
    if !track("delete", state.records.delete(&id).await)? {
        return Err(ApiError::NotFound { id });
    }
    info!(id = %id, "example deleted");
    Ok(Shaped(MessageResponse::new("Example deleted")))
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::records::store::RecordStore;
    use crate::test_utils::{send, test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_minimal_example() {
        let harness = test_app(None);
        let (status, headers, body) = send(
            &harness.app,
            json_request("POST", "/example/", json!({"name": "Ada", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Example created"}));
        assert_eq!(harness.records.len(), 1);

        let location = headers.get("location").unwrap().to_str().unwrap();
        let id = location.strip_prefix("/example/").unwrap();
        let stored = harness.records.get(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada");
        assert_eq!(stored.email, "ada@example.com");
        assert_eq!(stored.age, None);
        assert_eq!(stored.address, None);
    }

    #[tokio::test]
    async fn test_create_full_example_is_retrievable() {
        let harness = test_app(None);
        let payload = json!({
            "name": "Grace",
            "age": 85,
            "email": "grace@example.com",
            "address": {"street": "1 Navy Way", "city": "Arlington", "state": "VA", "zip": 22202}
        });
        let (status, headers, _) =
            send(&harness.app, json_request("POST", "/example/", payload)).await;
        assert_eq!(status, StatusCode::OK);

        let location = headers.get("location").unwrap().to_str().unwrap().to_string();
        let (status, _, body) = send(&harness.app, empty_request("GET", &location)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Grace");
        assert_eq!(body["age"].to_string(), "85");
        assert_eq!(body["address"]["city"], "Arlington");
        assert_eq!(body["address"]["zip"].to_string(), "22202");
    }

    #[tokio::test]
    async fn test_create_without_trailing_slash() {
        let harness = test_app(None);
        let (status, headers, body) = send(
            &harness.app,
            json_request("POST", "/example", json!({"name": "Ada", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Example created"}));
        assert!(headers.contains_key("location"));
        assert_eq!(harness.records.len(), 1);
    }

    #[tokio::test]
    async fn test_numbers_round_trip_unchanged() {
        let harness = test_app(None);
        let payload = json!({"name": "Ada", "email": "a@x.io", "age": 36.5, "address": {"zip": 7}});
        let (_, headers, _) = send(&harness.app, json_request("POST", "/example/", payload)).await;

        let location = headers.get("location").unwrap().to_str().unwrap().to_string();
        let (_, _, body) = send(&harness.app, empty_request("GET", &location)).await;
        assert_eq!(body["age"].to_string(), "36.5");
        assert_eq!(body["address"]["zip"].to_string(), "7");
    }

    #[tokio::test]
    async fn test_create_missing_required_fields_rejected() {
        let harness = test_app(None);
        for (payload, missing) in [
            (json!({"email": "x@example.com"}), "name"),
            (json!({"name": "NoEmail"}), "email"),
            (json!({}), "name"),
        ] {
            let (status, _, body) =
                send(&harness.app, json_request("POST", "/example/", payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                body["message"],
                format!("body must have required property '{missing}'")
            );
        }
        assert!(harness.records.is_empty());
    }

    #[tokio::test]
    async fn test_create_mistyped_fields_rejected() {
        let harness = test_app(None);
        let payload = json!({
            "name": "Ada",
            "email": "ada@example.com",
            "address": {"zip": "not a number"}
        });
        let (status, _, body) =
            send(&harness.app, json_request("POST", "/example/", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "body/address/zip must be number");
        assert!(harness.records.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_example() {
        let harness = test_app(None);
        let (status, _, body) = send(&harness.app, empty_request("GET", "/example/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Example 'nope' not found");
    }

    #[tokio::test]
    async fn test_update_example() {
        let harness = test_app(None);
        let created = harness
            .records
            .create(serde_json::from_value(json!({"name": "Ada", "email": "a@x.io"})).unwrap())
            .await
            .unwrap();

        let uri = format!("/example/{}", created.id);
        let (status, _, body) = send(
            &harness.app,
            json_request("PUT", &uri, json!({"name": "Ada L.", "email": "ada@x.io", "age": 36})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Example updated"}));

        let stored = harness.records.get(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada L.");
        assert_eq!(stored.age, Some(36.into()));
    }

    #[tokio::test]
    async fn test_update_unknown_example() {
        let harness = test_app(None);
        let (status, _, _) = send(
            &harness.app,
            json_request("PUT", "/example/ghost", json!({"name": "G", "email": "g@x.io"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(harness.records.is_empty());
    }

    #[tokio::test]
    async fn test_delete_example() {
        let harness = test_app(None);
        let created = harness
            .records
            .create(serde_json::from_value(json!({"name": "Ada", "email": "a@x.io"})).unwrap())
            .await
            .unwrap();
        let uri = format!("/example/{}", created.id);

        let (status, _, body) = send(&harness.app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Example deleted"}));
        assert!(harness.records.is_empty());

        let (status, _, _) = send(&harness.app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
