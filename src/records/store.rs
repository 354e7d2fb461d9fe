//! Abstract record store trait.
//!
//! Any persistence backend for Example records must implement
//! [`RecordStore`].  The trait uses `async_trait`-style methods (manual
//! desugaring with pinned futures) so both the in-memory map and SQLite
//! can sit behind the same `Arc<dyn RecordStore>`.

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::future::Future;
use std::pin::Pin;
use utoipa::ToSchema;

/// Postal address nested inside an Example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub zip: Option<Number>,
}

/// Example fields as supplied by a client (no id yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Example {
    pub name: String,
    /// Kept as the client wrote it: `85` stays `85`, `85.5` stays `85.5`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub age: Option<Number>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// A persisted Example with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExampleRecord {
    /// Opaque identifier assigned on creation.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub age: Option<Number>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl ExampleRecord {
    /// Attach `id` to client-supplied fields.
    pub fn from_example(id: impl Into<String>, example: Example) -> Self {
        Self {
            id: id.into(),
            name: example.name,
            age: example.age,
            email: example.email,
            address: example.address,
        }
    }
}

/// Generate a fresh record id.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async record store contract.
///
/// Each method is a single backend operation; there is no cross-call
/// transaction.
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record, assigning its id.
    fn create(
        &self,
        example: Example,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExampleRecord>> + Send + '_>>;

    /// Fetch a record by id.
    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ExampleRecord>>> + Send + '_>>;

    /// Replace the fields of the record with `record.id`.
    ///
    /// Returns `false` when no such record exists.
    fn update(
        &self,
        record: ExampleRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// Delete the record with `id`.
    ///
    /// Returns `false` when no such record exists.
    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
