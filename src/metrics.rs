//! Prometheus metrics for stencil.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "stencil_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "stencil_http_request_duration_seconds";

/// File uploads handed to the storage backend (counter). Labels: status.
pub const UPLOADS_TOTAL: &str = "stencil_uploads_total";

/// Bytes successfully uploaded (counter).
pub const UPLOAD_BYTES_TOTAL: &str = "stencil_upload_bytes_total";

/// Record store operations (counter). Labels: operation, status.
pub const RECORD_OPERATIONS_TOTAL: &str = "stencil_record_operations_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADS_TOTAL, "File uploads by outcome");
    describe_counter!(UPLOAD_BYTES_TOTAL, "Bytes uploaded to object storage");
    describe_counter!(RECORD_OPERATIONS_TOTAL, "Record store operations by type");
}

/// Count one upload attempt.
pub fn record_upload(ok: bool, bytes: usize) {
    let status = if ok { "ok" } else { "error" };
    counter!(UPLOADS_TOTAL, "status" => status).increment(1);
    if ok {
        counter!(UPLOAD_BYTES_TOTAL).increment(bytes as u64);
    }
}

/// Count one record store operation.
pub fn record_operation(operation: &'static str, status: &'static str) {
    counter!(RECORD_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template for metric labels.
///
/// Examples:
/// - `/param/abc` -> `/param/{id}`
/// - `/example/6f1c...` -> `/example/{id}`
/// - `/example/` -> `/example/`
/// - `/nope/deeper` -> `/{other}`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/basic" | "/body" | "/file" | "/example" | "/example/" | "/health"
        | "/metrics" | "/openapi.json" => path.to_string(),
        _ if path.starts_with("/param/") => "/param/{id}".to_string(),
        _ if path.starts_with("/example/") => "/example/{id}".to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_static_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/basic"), "/basic");
        assert_eq!(normalize_path("/file"), "/file");
        assert_eq!(normalize_path("/example"), "/example");
        assert_eq!(normalize_path("/example/"), "/example/");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
    }

    #[test]
    fn test_normalize_path_param() {
        assert_eq!(normalize_path("/param/42"), "/param/{id}");
        assert_eq!(normalize_path("/param/a%20b"), "/param/{id}");
        assert_eq!(normalize_path("/param/"), "/param/{id}");
    }

    #[test]
    fn test_normalize_path_example_id() {
        assert_eq!(
            normalize_path("/example/0b9a7c1e-1111-4c4c-9d9d-222233334444"),
            "/example/{id}"
        );
    }

    #[test]
    fn test_normalize_path_unknown() {
        assert_eq!(normalize_path("/wp-admin/login.php"), "/{other}");
    }
}
