//! stencil -- minimal HTTP service template.
//!
//! On SIGTERM/SIGINT the server stops accepting connections and drains
//! in-flight requests for at most `server.shutdown_timeout` seconds.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stencil::config::Config;
use stencil::records::store::RecordStore;
use stencil::storage::backend::ObjectStorage;

/// Command-line arguments for the stencil server.
#[derive(Parser, Debug)]
#[command(name = "stencil", version, about = "Minimal HTTP service template")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "stencil.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = stencil::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Configuration loaded from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        stencil::metrics::init_metrics()?;
        stencil::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let records = build_record_store(&config)?;
    let storage = build_storage(&config)?;

    let state = Arc::new(stencil::AppState {
        config: config.clone(),
        records,
        storage,
    });
    let app = stencil::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("stencil listening on {}", bind_addr);

    let drain = Duration::from_secs(config.server.shutdown_timeout);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(drain).await;
        } => {
            warn!("In-flight requests still running after {}s, exiting", drain.as_secs());
        }
    }

    info!("stencil shut down");
    Ok(())
}

/// `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_record_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.records.engine.as_str() {
        "sqlite" => {
            let path = &config.records.sqlite.path;
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = stencil::records::sqlite::SqliteRecordStore::new(path)?;
            info!("SQLite record store initialized at {}", path);
            Ok(Arc::new(store))
        }
        "memory" => {
            info!("In-memory record store initialized");
            Ok(Arc::new(stencil::records::memory::MemoryRecordStore::new()))
        }
        other => anyhow::bail!("unknown records.engine '{other}' (expected memory or sqlite)"),
    }
}

fn build_storage(config: &Config) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    match config.storage.backend.as_str() {
        "gcs" => {
            let gcs_config = config.storage.gcs.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'gcs' but storage.gcs config section is missing")
            })?;
            let backend = stencil::storage::gcs::GcsStorage::new(gcs_config)?;
            info!(
                "GCS storage backend initialized: bucket={} prefix='{}'",
                gcs_config.bucket, gcs_config.prefix
            );
            Ok(Arc::new(backend))
        }
        "memory" => {
            let base = &config.storage.memory.public_base_url;
            info!("In-memory storage backend initialized with base URL {}", base);
            Ok(Arc::new(stencil::storage::memory::MemoryStorage::new(base)))
        }
        other => anyhow::bail!("unknown storage.backend '{other}' (expected memory or gcs)"),
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
