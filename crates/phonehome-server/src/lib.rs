//! phonehome server library logic.
//!
//! Wires the ingestion and query services from `phonehome-calls` into an
//! axum router. The binary in `main.rs` only loads configuration, opens the
//! database and serves [`app`].

pub mod api;
pub mod config;
pub mod openapi;
pub mod origin;
pub mod repo_check;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    http::{header, HeaderValue, Method},
    routing::get,
    Extension, Json, Router,
};
use phonehome_calls::{CallStore, IngestService, QueryService};
use repo_check::RepoCheck;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Writes calls.
    pub ingest: IngestService,
    /// Reads and aggregates calls.
    pub query: QueryService,
    /// Repository-existence check applied to registrations, if enabled.
    pub repo_check: Option<RepoCheck>,
    /// Origins allowed by CORS. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Builds both services on top of one store.
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self {
            ingest: IngestService::new(store.clone()),
            query: QueryService::new(store),
            repo_check: None,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_repo_check(mut self, repo_check: RepoCheck) -> Self {
        self.repo_check = Some(repo_check);
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// Maximum accepted telemetry body (64 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Body of `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub version: String,
}

/// Health check handler.
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses((status = 200, description = "Server is up", body = Health))
)]
async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route(openapi::OPENAPI_PATH, get(openapi::openapi_handler))
        .route(
            "/{organisation}/{repository}",
            get(api::list_calls_handler).post(
                api::register_handler
                    .layer(axum::middleware::from_fn(repo_check::require_existing_repo)),
            ),
        )
        .route(
            "/{organisation}/{repository}/count",
            get(api::count_calls_handler),
        )
        .route(
            "/{organisation}/{repository}/count/daily",
            get(api::count_daily_handler),
        )
        .route(
            "/{organisation}/{repository}/count/badge",
            get(api::badge_handler),
        )
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
