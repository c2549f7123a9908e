//! HTTP handlers for registering and querying telemetry calls.

use crate::origin::ClientOrigin;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use phonehome_calls::{Badge, Call, CallError, CountResult, DayCount, FilterQuery, Payload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

/// Warning attached to a registration whose payload lost keys.
pub const STRIPPED_WARNING: &str = "WARN: payload got stripped of non-allowed content";

/// Query parameters accepted by the listing and count endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallsParams {
    /// Only calls whose payload contains this key.
    pub key: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub from_date: Option<NaiveDate>,
    /// `YYYY-MM-DD`, exclusive.
    pub to_date: Option<NaiveDate>,
    /// `""` or `"day"`; only read by `/count`.
    #[serde(default)]
    pub group_by: String,
}

impl CallsParams {
    fn into_filter(self, organisation: String, repository: String) -> FilterQuery {
        FilterQuery {
            organisation,
            repository,
            key: self.key.filter(|key| !key.is_empty()),
            from_date: self.from_date,
            to_date: self.to_date,
            group_by: self.group_by,
        }
    }
}

/// Response body for `POST /{organisation}/{repository}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    /// The payload as stored.
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response body for `GET /{organisation}/{repository}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallsResponse {
    pub query: FilterQuery,
    pub data: Vec<Call>,
}

/// Response body for `GET /{organisation}/{repository}/count`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub query: FilterQuery,
    pub data: CountResult,
}

/// Response body for `GET /{organisation}/{repository}/count/daily`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyCountResponse {
    pub query: FilterQuery,
    pub data: Vec<DayCount>,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            tracing::error!(error = %err, "call store failure");
            ApiError::InternalServerError(err.to_string())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

/// Runs a store-bound closure off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CallError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
        .map_err(ApiError::from)
}

/// Handler for `POST /{organisation}/{repository}`.
///
/// The body must be a JSON object (or empty). Nested values are stripped
/// and reported through `message`.
#[utoipa::path(
    post,
    path = "/{organisation}/{repository}",
    tag = "calls",
    params(
        ("organisation" = String, Path, description = "Organisation owning the repository"),
        ("repository" = String, Path, description = "Repository name"),
    ),
    request_body(
        content = Payload,
        description = "Flat JSON object; nested values are stripped",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Call registered", body = RegisterResponse),
        (status = 400, description = "Invalid payload or unknown repository", body = ErrorBody),
        (status = 413, description = "Body larger than 64 KiB", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn register_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    ClientOrigin(origin): ClientOrigin,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Path((organisation, repository)) = path?;
    let body = body?;

    let ingest = state.ingest.clone();
    let registration = run_blocking(move || {
        ingest.register(&organisation, &repository, &origin, &body)
    })
    .await?;

    Ok(Json(RegisterResponse {
        payload: registration.payload,
        message: registration.stripped.then(|| STRIPPED_WARNING.to_string()),
    }))
}

/// Handler for `GET /{organisation}/{repository}`.
///
/// Returns at most 3000 matching calls.
#[utoipa::path(
    get,
    path = "/{organisation}/{repository}",
    tag = "calls",
    params(
        ("organisation" = String, Path, description = "Organisation owning the repository"),
        ("repository" = String, Path, description = "Repository name"),
        CallsParams,
    ),
    responses(
        (status = 200, description = "Matching calls, unordered", body = CallsResponse),
        (status = 400, description = "Malformed filter", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn list_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    params: Result<Query<CallsParams>, QueryRejection>,
) -> Result<Json<CallsResponse>, ApiError> {
    let Path((organisation, repository)) = path?;
    let Query(params) = params?;
    let filter = CallsParams {
        group_by: String::new(),
        ..params
    }
    .into_filter(organisation, repository);

    let query = state.query.clone();
    let echo = filter.clone();
    let data = run_blocking(move || query.list_calls(&filter)).await?;

    Ok(Json(CallsResponse { query: echo, data }))
}

/// Handler for `GET /{organisation}/{repository}/count`.
///
/// `group_by=day` returns per-day counts instead of a single total.
#[utoipa::path(
    get,
    path = "/{organisation}/{repository}/count",
    tag = "counts",
    params(
        ("organisation" = String, Path, description = "Organisation owning the repository"),
        ("repository" = String, Path, description = "Repository name"),
        CallsParams,
    ),
    responses(
        (status = 200, description = "Total, or per-day counts with group_by=day", body = CountResponse),
        (status = 400, description = "Malformed filter or unsupported group_by", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn count_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    params: Result<Query<CallsParams>, QueryRejection>,
) -> Result<Json<CountResponse>, ApiError> {
    let Path((organisation, repository)) = path?;
    let Query(params) = params?;
    let filter = params.into_filter(organisation, repository);

    let query = state.query.clone();
    let echo = filter.clone();
    let data = run_blocking(move || query.count(&filter)).await?;

    Ok(Json(CountResponse { query: echo, data }))
}

/// Handler for `GET /{organisation}/{repository}/count/daily`.
#[utoipa::path(
    get,
    path = "/{organisation}/{repository}/count/daily",
    tag = "counts",
    params(
        ("organisation" = String, Path, description = "Organisation owning the repository"),
        ("repository" = String, Path, description = "Repository name"),
        CallsParams,
    ),
    responses(
        (status = 200, description = "Per-day counts, ascending by date", body = DailyCountResponse),
        (status = 400, description = "Malformed filter", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn count_daily_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    params: Result<Query<CallsParams>, QueryRejection>,
) -> Result<Json<DailyCountResponse>, ApiError> {
    let Path((organisation, repository)) = path?;
    let Query(params) = params?;
    let filter = CallsParams {
        group_by: String::new(),
        ..params
    }
    .into_filter(organisation, repository);

    let query = state.query.clone();
    let echo = filter.clone();
    let data = run_blocking(move || query.count_by_day(&filter)).await?;

    Ok(Json(DailyCountResponse { query: echo, data }))
}

/// Handler for `GET /{organisation}/{repository}/count/badge`.
///
/// Serves a shields.io endpoint badge with the scope's total count.
#[utoipa::path(
    get,
    path = "/{organisation}/{repository}/count/badge",
    tag = "counts",
    params(
        ("organisation" = String, Path, description = "Organisation owning the repository"),
        ("repository" = String, Path, description = "Repository name"),
    ),
    responses(
        (status = 200, description = "shields.io endpoint badge", body = Badge),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn badge_handler(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<Badge>, ApiError> {
    let Path((organisation, repository)) = path?;
    let query = state.query.clone();
    let badge = run_blocking(move || query.badge(&organisation, &repository)).await?;
    Ok(Json(badge))
}
