//! Declarative request/response shapes and their enforcement.
//!
//! Every route type implements [`Shape`], returning an [`ObjectSchema`]
//! that lists its fields, their primitive types, and whether they are
//! required.  The [`ValidatedJson`] and [`ValidatedPath`] extractors check
//! incoming data against that declaration before a handler runs; the
//! [`Shaped`] response wrapper drops anything not declared on the way out.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::errors::ApiError;

/// Primitive type of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object(ObjectSchema),
}

impl FieldType {
    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object(_) => "object",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object(_) => value.is_object(),
        }
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

/// An object shape: an ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
}

/// Where a violating value came from; prefixes violation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Body,
    Params,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Body => f.write_str("body"),
            Location::Params => f.write_str("params"),
        }
    }
}

/// First mismatch found between a value and its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path} {problem}")]
pub struct SchemaViolation {
    /// Location plus JSON-pointer-ish path, e.g. `body/address/zip`.
    pub path: String,
    /// What went wrong, e.g. `must be number`.
    pub problem: String,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field.
    pub fn required(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(Field {
            name,
            ty,
            required: true,
        });
        self
    }

    /// Declare an optional field.
    pub fn optional(mut self, name: &'static str, ty: FieldType) -> Self {
        self.fields.push(Field {
            name,
            ty,
            required: false,
        });
        self
    }

    /// Check `value` against this shape.
    ///
    /// Nulls count as absent.  Undeclared fields are ignored.
    pub fn validate(&self, value: &Value, location: Location) -> Result<(), SchemaViolation> {
        self.validate_at(value, &location.to_string())
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or_else(|| SchemaViolation {
            path: path.to_string(),
            problem: "must be object".to_string(),
        })?;

        for field in &self.fields {
            match object.get(field.name).filter(|v| !v.is_null()) {
                None if field.required => {
                    return Err(SchemaViolation {
                        path: path.to_string(),
                        problem: format!("must have required property '{}'", field.name),
                    });
                }
                None => {}
                Some(v) => {
                    let field_path = format!("{path}/{}", field.name);
                    if !field.ty.accepts(v) {
                        return Err(SchemaViolation {
                            path: field_path,
                            problem: format!("must be {}", field.ty.name()),
                        });
                    }
                    if let FieldType::Object(nested) = &field.ty {
                        nested.validate_at(v, &field_path)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Reduce `value` to the declared fields, dropping nulls.
    ///
    /// Non-object input yields an empty object.
    pub fn shape(&self, value: Value) -> Value {
        let Value::Object(mut object) = value else {
            return Value::Object(Map::new());
        };
        let mut out = Map::new();
        for field in &self.fields {
            let Some(v) = object.remove(field.name) else {
                continue;
            };
            if v.is_null() {
                continue;
            }
            let v = match &field.ty {
                FieldType::Object(nested) => nested.shape(v),
                _ => v,
            };
            out.insert(field.name.to_string(), v);
        }
        Value::Object(out)
    }
}

/// Types that declare their wire shape.
pub trait Shape {
    fn shape() -> ObjectSchema;
}

// -- Extractors ---------------------------------------------------------------

/// JSON body extractor that enforces `T::shape()` before deserializing.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: Shape + DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(req.headers()) {
            return Err(ApiError::UnsupportedMediaType);
        }
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest {
                message: e.body_text(),
            })?;
        if body.is_empty() {
            return Err(ApiError::BadRequest {
                message: "Body cannot be empty when content-type is set to 'application/json'"
                    .to_string(),
            });
        }
        let value: Value = serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest {
            message: format!("Body is not valid JSON: {e}"),
        })?;
        T::shape().validate(&value, Location::Body)?;
        let parsed = serde_json::from_value(value).map_err(|e| ApiError::BadRequest {
            message: format!("body {e}"),
        })?;
        Ok(ValidatedJson(parsed))
    }
}

/// Path parameter extractor that enforces `T::shape()`.
///
/// Routes registered without a parameter segment produce an empty object,
/// so optional parameters simply come through as absent.
#[derive(Debug, Clone)]
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedPath<T>
where
    T: Shape + DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = match Path::<HashMap<String, String>>::from_request_parts(parts, state).await
        {
            Ok(Path(params)) => params,
            Err(axum::extract::rejection::PathRejection::MissingPathParams(_)) => HashMap::new(),
            Err(e) => {
                return Err(ApiError::BadRequest {
                    message: e.body_text(),
                })
            }
        };
        let value = Value::Object(
            params
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        );
        T::shape().validate(&value, Location::Params)?;
        let parsed = serde_json::from_value(value).map_err(|e| ApiError::BadRequest {
            message: format!("params {e}"),
        })?;
        Ok(ValidatedPath(parsed))
    }
}

/// JSON response reduced to the fields `T::shape()` declares.
#[derive(Debug, Clone)]
pub struct Shaped<T>(pub T);

impl<T> IntoResponse for Shaped<T>
where
    T: Shape + Serialize,
{
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => (StatusCode::OK, Json(T::shape().shape(value))).into_response(),
            Err(e) => ApiError::Internal(anyhow::anyhow!("response serialization failed: {e}"))
                .into_response(),
        }
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> ObjectSchema {
        ObjectSchema::new()
            .required("name", FieldType::String)
            .optional("age", FieldType::Number)
            .optional(
                "address",
                FieldType::Object(
                    ObjectSchema::new()
                        .optional("city", FieldType::String)
                        .optional("zip", FieldType::Number),
                ),
            )
    }

    #[test]
    fn test_validate_accepts_minimal_object() {
        assert!(person().validate(&json!({"name": "Ada"}), Location::Body).is_ok());
    }

    #[test]
    fn test_validate_ignores_undeclared_fields() {
        let value = json!({"name": "Ada", "nickname": 7});
        assert!(person().validate(&value, Location::Body).is_ok());
    }

    #[test]
    fn test_validate_missing_required() {
        let err = person()
            .validate(&json!({"age": 3}), Location::Body)
            .unwrap_err();
        assert_eq!(err.to_string(), "body must have required property 'name'");
    }

    #[test]
    fn test_validate_null_required_is_missing() {
        let err = person()
            .validate(&json!({"name": null}), Location::Body)
            .unwrap_err();
        assert_eq!(err.problem, "must have required property 'name'");
    }

    #[test]
    fn test_validate_wrong_type() {
        let err = person()
            .validate(&json!({"name": "Ada", "age": "forty"}), Location::Body)
            .unwrap_err();
        assert_eq!(err.to_string(), "body/age must be number");
    }

    #[test]
    fn test_validate_nested_wrong_type() {
        let value = json!({"name": "Ada", "address": {"zip": "02139"}});
        let err = person().validate(&value, Location::Body).unwrap_err();
        assert_eq!(err.to_string(), "body/address/zip must be number");
    }

    #[test]
    fn test_validate_nested_not_object() {
        let value = json!({"name": "Ada", "address": "Main St"});
        let err = person().validate(&value, Location::Body).unwrap_err();
        assert_eq!(err.to_string(), "body/address must be object");
    }

    #[test]
    fn test_validate_non_object_root() {
        let err = person()
            .validate(&json!(["Ada"]), Location::Params)
            .unwrap_err();
        assert_eq!(err.to_string(), "params must be object");
    }

    #[test]
    fn test_number_accepts_float_and_int() {
        assert!(person()
            .validate(&json!({"name": "Ada", "age": 36.5}), Location::Body)
            .is_ok());
        assert!(person()
            .validate(&json!({"name": "Ada", "age": 36}), Location::Body)
            .is_ok());
    }

    #[test]
    fn test_shape_drops_undeclared_and_null() {
        let value = json!({
            "name": "Ada",
            "age": null,
            "secret": "x",
            "address": {"city": "London", "planet": "Earth"}
        });
        assert_eq!(
            person().shape(value),
            json!({"name": "Ada", "address": {"city": "London"}})
        );
    }

    #[test]
    fn test_shape_non_object_is_empty() {
        assert_eq!(person().shape(json!("Ada")), json!({}));
    }

    #[test]
    fn test_json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content_type(&headers));
        headers.insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json_content_type(&headers));
        headers.insert(CONTENT_TYPE, "application/merge-patch+json".parse().unwrap());
        assert!(is_json_content_type(&headers));
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(!is_json_content_type(&headers));
    }
}
