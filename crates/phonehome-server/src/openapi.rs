//! OpenAPI (3.1) description of the HTTP API, served at [`OPENAPI_PATH`].

use std::sync::OnceLock;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use utoipa::OpenApi;

use crate::api::ApiError;

/// Route of the generated document.
pub const OPENAPI_PATH: &str = "/openapi/doc.json";

/// OpenAPI documentation for the phonehome telemetry API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "phonehome",
        version = env!("CARGO_PKG_VERSION"),
        description = "Anonymous usage telemetry for open source projects."
    ),
    paths(
        crate::health,
        crate::openapi::openapi_handler,
        crate::api::register_handler,
        crate::api::list_calls_handler,
        crate::api::count_calls_handler,
        crate::api::count_daily_handler,
        crate::api::badge_handler,
    ),
    components(
        schemas(
            crate::Health,
            crate::api::ErrorBody,
            crate::api::RegisterResponse,
            crate::api::CallsResponse,
            crate::api::CountResponse,
            crate::api::DailyCountResponse,
        )
    ),
    tags(
        (name = "calls", description = "Registering and listing calls"),
        (name = "counts", description = "Counts, daily aggregates and badges"),
        (name = "meta", description = "Health and API description"),
    ),
)]
pub struct ApiDoc;

/// Returns the generated OpenAPI document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

static OPENAPI_JSON: OnceLock<String> = OnceLock::new();

/// The OpenAPI document as pretty JSON, rendered once.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn openapi_json() -> Result<String, serde_json::Error> {
    if let Some(doc) = OPENAPI_JSON.get() {
        return Ok(doc.clone());
    }

    let doc = serde_json::to_string_pretty(&openapi())?;
    Ok(OPENAPI_JSON.get_or_init(|| doc).clone())
}

/// Handler for `GET /openapi/doc.json`.
#[utoipa::path(
    get,
    path = "/openapi/doc.json",
    tag = "meta",
    responses(
        (status = 200, description = "OpenAPI document", body = String, content_type = "application/json"),
        (status = 500, description = "Serialization failure", body = crate::api::ErrorBody),
    )
)]
pub async fn openapi_handler() -> Response {
    match openapi_json() {
        Ok(doc) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], doc).into_response(),
        Err(err) => {
            ApiError::InternalServerError(format!("failed to serialize OpenAPI document: {err}"))
                .into_response()
        }
    }
}
