//! Configuration loading and types for stencil.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section has defaults, so an empty file (or
//! no file at all) yields a runnable in-memory service.

use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Environment variable consulted when `server.environment` is unset.
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Example record persistence.
    #[serde(default)]
    pub records: RecordsConfig,

    /// Upload storage backend.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Runtime environment name reported by `GET /` (e.g. `development`).
    #[serde(default)]
    pub environment: Option<String>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Attach a permissive CORS layer.
    #[serde(default)]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: None,
            shutdown_timeout: default_shutdown_timeout(),
            cors: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsConfig {
    /// Backend type: `memory` or `sqlite`.
    #[serde(default = "default_records_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            engine: default_records_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific record store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_sqlite_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
        }
    }
}

/// Upload storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `memory` or `gcs`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// In-memory backend configuration.
    #[serde(default)]
    pub memory: MemoryStorageConfig,

    /// Google Cloud Storage configuration.
    #[serde(default)]
    pub gcs: Option<GcsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            memory: MemoryStorageConfig::default(),
            gcs: None,
        }
    }
}

/// In-memory storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStorageConfig {
    /// Base of the URLs handed back for stored files.
    #[serde(default = "default_memory_base_url")]
    pub public_base_url: String,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_memory_base_url(),
        }
    }
}

/// Google Cloud Storage configuration (the bucket behind a Firebase project).
#[derive(Debug, Clone, Deserialize)]
pub struct GcsStorageConfig {
    /// Bucket name, e.g. `my-project.appspot.com`.
    pub bucket: String,
    /// Prefix prepended to every object name.
    #[serde(default)]
    pub prefix: String,
    /// Path to a service account JSON file.
    #[serde(default)]
    pub credentials_file: Option<String>,
    /// Fixed bearer token; skips credential discovery (emulators, CI).
    #[serde(default)]
    pub access_token: Option<String>,
    /// JSON API upload endpoint (override for emulators).
    #[serde(default = "default_gcs_upload_base")]
    pub upload_base: String,
    /// Base of the public object URLs (`public_read` access).
    #[serde(default = "default_gcs_public_base")]
    pub public_base: String,
    /// Base of Firebase download URLs (`download_token` access).
    #[serde(default = "default_gcs_download_base")]
    pub download_base: String,
    /// How uploaded objects are made readable through the returned URL.
    #[serde(default)]
    pub access: GcsAccess,
}

/// Read access granted to uploaded objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcsAccess {
    /// Attach a Firebase download token; the URL carries the token.
    /// Works on private buckets.
    #[default]
    DownloadToken,
    /// Upload with `predefinedAcl=publicRead` and return the plain object
    /// URL. The bucket must allow fine-grained ACLs.
    PublicRead,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_records_engine() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> String {
    "./data/records.db".to_string()
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_memory_base_url() -> String {
    "memory://uploads".to_string()
}

pub(crate) fn default_gcs_upload_base() -> String {
    "https://storage.googleapis.com/upload/storage/v1".to_string()
}

pub(crate) fn default_gcs_public_base() -> String {
    "https://storage.googleapis.com".to_string()
}

pub(crate) fn default_gcs_download_base() -> String {
    "https://firebasestorage.googleapis.com".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A missing file is not an error: defaults are used and a warning is
/// logged. `APP_ENV` fills `server.environment` when the file leaves it unset.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        parse_config(&contents)?
    } else {
        warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };
    if config.server.environment.is_none() {
        config.server.environment = std::env::var(ENVIRONMENT_VAR).ok();
    }
    Ok(config)
}

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
