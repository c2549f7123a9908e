//! Anonymised caller fingerprint stored with every call.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the caller's IP address.
///
/// The raw address is never stored or logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

/// Resolves the client address: first `X-Forwarded-For` hop, then the
/// socket peer, else an empty string.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}

pub fn hash_origin(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(hash_origin(&client_ip(&parts.headers, peer))))
    }
}
