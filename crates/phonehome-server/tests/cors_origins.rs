use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use phonehome_calls::MemoryCallStore;
use phonehome_server::{app, AppState};
use std::sync::Arc;
use tower::ServiceExt;

fn build_test_state(cors_origins: Vec<String>) -> AppState {
    AppState::new(Arc::new(MemoryCallStore::new())).with_cors_origins(cors_origins)
}

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri("/acme/widget/count")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn configured_origin_is_allowed() {
    let app = app(build_test_state(vec!["http://localhost:8080".to_string()]));

    let response = app
        .clone()
        .oneshot(preflight("http://localhost:8080"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:8080"
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:8080"
    );
}

#[tokio::test]
async fn unknown_origin_gets_no_allow_header() {
    let app = app(build_test_state(vec!["http://localhost:8080".to_string()]));

    let response = app.oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn wildcard_allows_any_origin() {
    let app = app(build_test_state(vec!["*".to_string()]));

    let response = app.oneshot(preflight("https://anywhere.example")).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
