use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    http::{Method, Request, StatusCode, Uri},
    Router,
};
use phonehome_calls::MemoryCallStore;
use phonehome_server::repo_check::{GithubRepoChecker, RepoCheck, RepoCheckError, RepoChecker};
use phonehome_server::{app, AppState};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Stand-in GitHub API that knows a single repository and records every
/// request path it receives.
async fn spawn_github() -> (String, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let router = Router::new().fallback(move |uri: Uri| {
        let recorder = recorder.clone();
        async move {
            recorder.lock().unwrap().push(uri.path().to_string());
            if uri.path() == "/repos/acme/widget" {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            }
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn checker(api_url: &str) -> GithubRepoChecker {
    GithubRepoChecker::new(api_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn status_decides_existence() {
    let (api_url, seen) = spawn_github().await;
    let checker = checker(&api_url);

    assert!(checker.exists("acme", "widget").await.unwrap());
    assert!(!checker.exists("acme", "gadget").await.unwrap());
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["/repos/acme/widget", "/repos/acme/gadget"]
    );
}

#[tokio::test]
async fn unreachable_api_is_inconclusive() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let checker = checker(&format!("http://{addr}"));

    match checker.exists("acme", "widget").await {
        Err(RepoCheckError::ScopeLookupFailed {
            organisation,
            repository,
            ..
        }) => {
            assert_eq!(organisation, "acme");
            assert_eq!(repository, "widget");
        }
        other => panic!("expected a failed lookup, got {other:?}"),
    }
}

#[tokio::test]
async fn dot_segments_never_leave_the_repos_path() {
    let (api_url, seen) = spawn_github().await;
    let state = AppState::new(Arc::new(MemoryCallStore::new())).with_repo_check(RepoCheck {
        checker: Arc::new(checker(&api_url)),
        fail_open: false,
    });
    let app = app(state);

    let (status, json) = post(&app, "/%2E%2E/%2E%2E%2Forgs%2Fdatarootsio").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "github repository doesn't seem to exist: ../../orgs/datarootsio"
    );
    assert!(seen.lock().unwrap().is_empty());

    let (status, _) = post(&app, "/acme/widget").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*seen.lock().unwrap(), vec!["/repos/acme/widget"]);
}

async fn post(app: &Router, uri: &str) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::from(r#"{"os":"linux"}"#))
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
