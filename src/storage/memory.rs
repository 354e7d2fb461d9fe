//! In-memory storage backend.
//!
//! Uploaded files are held in a `tokio::sync::RwLock<HashMap<...>>`
//! keyed by file name.  URLs are built from a configurable base so
//! clients see the same shape a real bucket would hand back.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{encode_key, FileMetadata, ObjectStorage, UploadTarget};

/// A file held by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub content: Bytes,
    pub metadata: FileMetadata,
}

/// In-memory storage backend.
pub struct MemoryStorage {
    /// name -> stored file. Last write wins.
    files: tokio::sync::RwLock<HashMap<String, StoredFile>>,
    /// Base of returned URLs, without a trailing slash.
    public_base_url: String,
}

impl MemoryStorage {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            files: tokio::sync::RwLock::new(HashMap::new()),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL a file named `name` is reachable at.
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.public_base_url, encode_key(name))
    }

    /// Fetch a stored file by name.
    pub async fn get(&self, name: &str) -> Option<StoredFile> {
        self.files.read().await.get(name).cloned()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }
}

impl ObjectStorage for MemoryStorage {
    fn upload_file(
        &self,
        name: &str,
        content: Bytes,
        metadata: FileMetadata,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            UploadTarget::check(&name, &metadata)?;
            tracing::debug!(name = %name, size = content.len(), "memory upload");
            let url = self.url_for(&name);
            self.files
                .write()
                .await
                .insert(name, StoredFile { content, metadata });
            Ok(url)
        })
    }
}
