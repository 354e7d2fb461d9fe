//! stencil library: a minimal HTTP service template.
//!
//! Routes are declared with typed request/response shapes enforced by the
//! [`schema`] layer.  Handlers delegate Example persistence to a
//! [`records::store::RecordStore`] and file uploads to a
//! [`storage::backend::ObjectStorage`].

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod records;
pub mod schema;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::config::Config;
use crate::records::store::RecordStore;
use crate::storage::backend::ObjectStorage;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// Example record persistence.
    pub records: Arc<dyn RecordStore>,
    /// Upload storage client, built once at startup.
    pub storage: Arc<dyn ObjectStorage>,
}
