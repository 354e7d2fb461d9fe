//! Abstract object storage trait.
//!
//! Every upload backend must implement [`ObjectStorage`].  A single
//! instance is built at startup and shared through `AppState`, so
//! implementations must be safe for concurrent use.

use bytes::Bytes;
use garde::Validate;
use std::future::Future;
use std::pin::Pin;

/// Metadata stored alongside an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// MIME type of the content.
    pub content_type: String,
}

impl FileMetadata {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }
}

/// Input constraints checked before any backend call.
#[derive(Debug, Validate)]
pub struct UploadTarget<'a> {
    /// Storage key; must be non-empty.
    #[garde(length(min = 1))]
    pub name: &'a str,
    /// MIME type; must be non-empty.
    #[garde(length(min = 1))]
    pub content_type: &'a str,
}

impl<'a> UploadTarget<'a> {
    /// Validate `name` and `metadata` for an upload.
    pub fn check(name: &'a str, metadata: &'a FileMetadata) -> anyhow::Result<()> {
        UploadTarget {
            name,
            content_type: &metadata.content_type,
        }
        .validate()
        .map_err(|report| anyhow::anyhow!("invalid upload: {report}"))
    }
}

/// Async object storage contract.
pub trait ObjectStorage: Send + Sync + 'static {
    /// Store `content` under `name` and return a URL addressing it.
    ///
    /// The call either fully succeeds or returns an error; nothing is
    /// retried.
    fn upload_file(
        &self,
        name: &str,
        content: Bytes,
        metadata: FileMetadata,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}

/// Percent-encode a storage key for use inside a URL path.
///
/// Slashes are kept so nested keys read naturally.
pub fn encode_key(name: &str) -> String {
    const KEY: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
        .remove(b'/')
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');
    percent_encoding::utf8_percent_encode(name, KEY).to_string()
}
