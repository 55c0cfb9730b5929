use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::types::Role;
use crate::ws::{parse_role, WsQuery};

/// HTTP Basic Auth for the host panel and host WebSocket
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// HOST_USERNAME and HOST_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("HOST_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("HOST_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Host authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "HOST_USERNAME and HOST_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Host authentication DISABLED - anyone can run the draw!");
            Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true,
        }
    }

    /// Check the `Authorization: Basic ...` header of a request
    pub fn authorizes(&self, headers: &HeaderMap) -> bool {
        if !self.is_enabled() {
            return true;
        }
        basic_credentials(headers)
            .map(|(username, password)| self.validate(&username, &password))
            .unwrap_or(false)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Decode `user:password` from a Basic Authorization header
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Requests that need host credentials
///
/// The socket role is read through the same query extractor the upgrade
/// handler uses, so encodings like `role=h%6Fst` are judged after decoding.
fn is_host_request(request: &Request<Body>) -> bool {
    match request.uri().path() {
        "/host" | "/host.html" => true,
        "/ws" => match Query::<WsQuery>::try_from_uri(request.uri()) {
            Ok(Query(params)) => parse_role(params.role.as_deref()) == Role::Host,
            // The upgrade handler rejects it too
            Err(_) => false,
        },
        path => path.starts_with("/api/state/"),
    }
}

fn unauthorized() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Prize Draw Host\"")],
        "Unauthorized",
    )
        .into_response()
}

/// Require Basic Auth for the host page, `/ws?role=host` and `/api/state/*`.
///
/// Display screens and the winners export pass through untouched.
pub async fn host_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if !is_host_request(&request) || auth_config.authorizes(request.headers()) {
        return next.run(request).await;
    }
    tracing::warn!("Rejected unauthenticated host request to {}", request.uri().path());
    unauthorized()
}

/// Serve the host panel from the static directory
pub async fn serve_host() -> impl IntoResponse {
    match tokio::fs::read_to_string("static/host.html").await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Host page not found").into_response(),
    }
}
