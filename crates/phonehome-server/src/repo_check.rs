//! Optional check that a call targets an existing GitHub repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{rejection::PathRejection, Extension, Path},
    http::Request,
    middleware::Next,
    response::Response,
};
use reqwest::Url;
use thiserror::Error;

use crate::api::ApiError;
use crate::AppState;

/// Errors raised while setting up or running a repository lookup.
#[derive(Debug, Error)]
pub enum RepoCheckError {
    /// The lookup could not reach a verdict.
    #[error("repository lookup for {organisation}/{repository} failed: {reason}")]
    ScopeLookupFailed {
        organisation: String,
        repository: String,
        reason: String,
    },

    #[error("invalid GitHub API url '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("failed to build GitHub client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Answers whether `organisation/repository` exists.
#[async_trait]
pub trait RepoChecker: Send + Sync {
    async fn exists(&self, organisation: &str, repository: &str) -> Result<bool, RepoCheckError>;
}

/// Queries `GET {api_url}/repos/{organisation}/{repository}`; HTTP 200 means
/// the repository exists, any other status means it does not.
#[derive(Debug, Clone)]
pub struct GithubRepoChecker {
    client: reqwest::Client,
    api_url: Url,
}

/// A name GitHub could hold: non-empty, not a dot segment, no separators.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

impl GithubRepoChecker {
    /// # Errors
    ///
    /// - `RepoCheckError::InvalidApiUrl` if `api_url` is not an absolute base URL.
    /// - `RepoCheckError::Client` if the HTTP client cannot be built.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, RepoCheckError> {
        let invalid = |reason: String| RepoCheckError::InvalidApiUrl {
            url: api_url.to_string(),
            reason,
        };
        let parsed = Url::parse(api_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("not a base url".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("phonehome-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: parsed,
        })
    }

    /// Lookup URL for a scope, each name encoded as a single path segment.
    ///
    /// `None` when either name can never exist on GitHub.
    pub fn repo_url(&self, organisation: &str, repository: &str) -> Option<Url> {
        if !is_plain_name(organisation) || !is_plain_name(repository) {
            return None;
        }

        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["repos", organisation, repository]);
        Some(url)
    }
}

#[async_trait]
impl RepoChecker for GithubRepoChecker {
    async fn exists(&self, organisation: &str, repository: &str) -> Result<bool, RepoCheckError> {
        let Some(url) = self.repo_url(organisation, repository) else {
            tracing::debug!(%organisation, %repository, "scope is not a valid GitHub name");
            return Ok(false);
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            RepoCheckError::ScopeLookupFailed {
                organisation: organisation.to_string(),
                repository: repository.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(response.status() == reqwest::StatusCode::OK)
    }
}

/// Repository check wired into the application state.
#[derive(Clone)]
pub struct RepoCheck {
    pub checker: Arc<dyn RepoChecker>,
    /// Proceed when the checker cannot reach a verdict.
    pub fail_open: bool,
}

/// Middleware rejecting calls to repositories that do not exist.
///
/// A no-op when the state carries no [`RepoCheck`].
pub async fn require_existing_repo(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<(String, String)>, PathRejection>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(check) = state.repo_check.as_ref() else {
        return Ok(next.run(req).await);
    };
    let Path((organisation, repository)) = path?;

    match check.checker.exists(&organisation, &repository).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::info!(%organisation, %repository, "rejecting call for unknown repository");
            Err(ApiError::BadRequest(format!(
                "github repository doesn't seem to exist: {organisation}/{repository}"
            )))
        }
        Err(e) if check.fail_open => {
            tracing::warn!(error = %e, "repository check inconclusive, letting call through");
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::warn!(error = %e, "repository check inconclusive, rejecting call");
            Err(ApiError::BadRequest(e.to_string()))
        }
    }
}
