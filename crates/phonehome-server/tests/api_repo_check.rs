use async_trait::async_trait;
use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    http::{Method, Request, StatusCode},
    Router,
};
use phonehome_calls::MemoryCallStore;
use phonehome_server::repo_check::{RepoCheck, RepoCheckError, RepoChecker};
use phonehome_server::{app, AppState};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

enum Verdict {
    Exists,
    Missing,
    Unreachable,
}

struct StubChecker {
    verdict: Verdict,
    calls: AtomicUsize,
}

impl StubChecker {
    fn new(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RepoChecker for StubChecker {
    async fn exists(&self, organisation: &str, repository: &str) -> Result<bool, RepoCheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.verdict {
            Verdict::Exists => Ok(true),
            Verdict::Missing => Ok(false),
            Verdict::Unreachable => Err(RepoCheckError::ScopeLookupFailed {
                organisation: organisation.to_string(),
                repository: repository.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

fn build_app(checker: Arc<StubChecker>, fail_open: bool) -> Router {
    let state = AppState::new(Arc::new(MemoryCallStore::new())).with_repo_check(RepoCheck {
        checker,
        fail_open,
    });
    app(state)
}

async fn request(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    req.extensions_mut().insert(ConnectInfo(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        40_000,
    )));

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn existing_repository_is_registered() {
    let checker = StubChecker::new(Verdict::Exists);
    let app = build_app(checker.clone(), false);

    let (status, json) = request(&app, Method::POST, "/acme/widget", r#"{"a":1}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payload"]["a"], 1);
    assert_eq!(checker.calls.load(Ordering::SeqCst), 1);

    let (_, json) = request(&app, Method::GET, "/acme/widget/count", "").await;
    assert_eq!(json["data"], 1);
}

#[tokio::test]
async fn missing_repository_is_rejected() {
    let checker = StubChecker::new(Verdict::Missing);
    let app = build_app(checker, true);

    let (status, json) = request(&app, Method::POST, "/acme/ghost", r#"{"a":1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "github repository doesn't seem to exist: acme/ghost"
    );

    let (_, json) = request(&app, Method::GET, "/acme/ghost/count", "").await;
    assert_eq!(json["data"], 0);
}

#[tokio::test]
async fn unreachable_checker_fails_open() {
    let app = build_app(StubChecker::new(Verdict::Unreachable), true);

    let (status, _) = request(&app, Method::POST, "/acme/widget", r#"{"a":1}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = request(&app, Method::GET, "/acme/widget/count", "").await;
    assert_eq!(json["data"], 1);
}

#[tokio::test]
async fn unreachable_checker_fails_closed() {
    let app = build_app(StubChecker::new(Verdict::Unreachable), false);

    let (status, json) = request(&app, Method::POST, "/acme/widget", r#"{"a":1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));

    let (_, json) = request(&app, Method::GET, "/acme/widget/count", "").await;
    assert_eq!(json["data"], 0);
}

#[tokio::test]
async fn reads_skip_the_check() {
    let checker = StubChecker::new(Verdict::Missing);
    let app = build_app(checker.clone(), false);

    for uri in [
        "/acme/ghost",
        "/acme/ghost/count",
        "/acme/ghost/count/daily",
        "/acme/ghost/count/badge",
    ] {
        let (status, _) = request(&app, Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
    assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
}
