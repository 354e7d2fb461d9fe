//! Axum router construction.
//!
//! The [`app`] function wires every route to its handler and returns a
//! ready-to-serve [`axum::Router`].

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::generate_request_id;
use crate::handlers::{self, example, root};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Header carrying the per-response request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const SERVER_NAME: &str = "stencil";

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the stencil API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "stencil",
        version = "0.1.0",
        description = "Minimal HTTP service template"
    ),
    paths(
        handlers::health_check,
        root::get_root,
        root::get_basic,
        root::get_param,
        root::post_body,
        root::upload_file,
        example::create_example,
        example::get_example,
        example::update_example,
        example::delete_example,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Root", description = "Root route"),
        (name = "Example", description = "Example routes"),
    )
)]
pub struct ApiDoc;

/// `GET /openapi.json` -- the generated OpenAPI document.
async fn openapi_handler() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors;
    let metrics_enabled = state.config.observability.metrics;

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_handler))
        .route("/", get(root::get_root))
        .route("/basic", get(root::get_basic))
        .route("/param/", get(root::get_param))
        .route("/param/:id", get(root::get_param))
        .route("/body", post(root::post_body))
        .route("/file", post(root::upload_file))
        .route("/example", post(example::create_example))
        .route("/example/", post(example::create_example))
        .route(
            "/example/:id",
            get(example::get_example)
                .put(example::update_example)
                .delete(example::delete_example),
        )
        .with_state(state)
        // Inner layers run first; outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(CorsLayer::permissive());
    }
    if metrics_enabled {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }

    // Uploads are buffered whole; no size cap.
    router.layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id` (unless a handler set one), `date` and `server` to
/// every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static(SERVER_NAME));

    response
}

// -- Tests --------------------------------------------------------------------
