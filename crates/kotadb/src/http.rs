//! Local HTTP front-end for the RPC server.
//!
//! `POST /mcp` carries one framed request per call after header validation:
//! Origin allow-list, protocol-version match, Accept parsing, and session-id
//! bounds. Responses are plain JSON; the SSE accept flag is recorded but
//! streaming is not served.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::server::RpcServer;

/// Maximum accepted `Mcp-Session-Id` length in bytes.
const MAX_SESSION_ID_BYTES: usize = 256;

/// Parsed Accept header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptFlags {
    pub json: bool,
    pub sse: bool,
}

/// Shared state for HTTP handlers.
pub struct AppState {
    pub server: Mutex<RpcServer>,
    pub allowed_origins: Vec<String>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/healthz", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server, bound to localhost only.
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("HTTP front-end listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn handle_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let mut server = state.server.lock().await;
    validate_headers(&headers, &state.allowed_origins, server.negotiated_version())
        .map_err(|(status, message)| (status, Json(json!({"error": message}))))?;

    match server.handle(&body).await {
        Some(reply) => Ok(Json(reply)),
        // Notifications are accepted silently.
        None => Ok(Json(json!({}))),
    }
}

/// Validate the transport headers for one request.
pub fn validate_headers(
    headers: &HeaderMap,
    allowed_origins: &[String],
    negotiated_version: &str,
) -> Result<AcceptFlags, (StatusCode, String)> {
    if let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) {
        if !origin_allowed(origin, allowed_origins) {
            return Err((
                StatusCode::FORBIDDEN,
                format!("origin not allowed: {origin}"),
            ));
        }
    }

    if let Some(version) = headers
        .get("mcp-protocol-version")
        .and_then(|v| v.to_str().ok())
    {
        if version != negotiated_version {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "protocol version mismatch: client sent {version}, negotiated {negotiated_version}"
                ),
            ));
        }
    }

    let accept = parse_accept(
        headers
            .get("accept")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("*/*"),
    );
    if !accept.json {
        return Err((
            StatusCode::NOT_ACCEPTABLE,
            "client must accept application/json".to_string(),
        ));
    }

    if let Some(session) = headers.get("mcp-session-id") {
        let bytes = session.as_bytes();
        if bytes.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                "Mcp-Session-Id must not be empty".to_string(),
            ));
        }
        if bytes.len() > MAX_SESSION_ID_BYTES {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Mcp-Session-Id exceeds {MAX_SESSION_ID_BYTES} bytes"),
            ));
        }
    }

    Ok(accept)
}

/// Exact match against the allow-list, or same protocol and host when only
/// the port differs.
fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    if allowed.iter().any(|a| a == origin) {
        return true;
    }
    let Some((scheme, host)) = scheme_and_host(origin) else {
        return false;
    };
    allowed.iter().any(|a| {
        scheme_and_host(a).is_some_and(|(allowed_scheme, allowed_host)| {
            allowed_scheme == scheme && allowed_host == host
        })
    })
}

fn scheme_and_host(origin: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = origin.split_once("://")?;
    let host = rest.split([':', '/']).next()?;
    if host.is_empty() {
        None
    } else {
        Some((scheme, host))
    }
}

fn parse_accept(value: &str) -> AcceptFlags {
    let mut flags = AcceptFlags::default();
    for token in value.split(',') {
        let media = token.split(';').next().unwrap_or("").trim();
        match media {
            "application/json" | "application/*" | "*/*" => flags.json = true,
            "text/event-stream" => flags.sse = true,
            _ => {}
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn allowed() -> Vec<String> {
        vec!["http://localhost:3000".to_string()]
    }

    #[test]
    fn origin_exact_match_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("http://localhost:3000"));
        assert!(validate_headers(&headers, &allowed(), "2024-11-05").is_ok());
    }

    #[test]
    fn origin_same_host_other_port_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("http://localhost:8080"));
        assert!(validate_headers(&headers, &allowed(), "2024-11-05").is_ok());
    }

    #[test]
    fn origin_other_scheme_fails() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://localhost:3000"));
        let err = validate_headers(&headers, &allowed(), "2024-11-05").unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn unlisted_origin_fails() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("http://evil.example"));
        let err = validate_headers(&headers, &allowed(), "2024-11-05").unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn protocol_version_mismatch_fails() {
        let mut headers = HeaderMap::new();
        headers.insert("mcp-protocol-version", HeaderValue::from_static("2025-01-01"));
        let err = validate_headers(&headers, &[], "2024-11-05").unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn accept_parses_json_and_sse_flags() {
        let flags = parse_accept("application/json, text/event-stream;q=0.9");
        assert!(flags.json);
        assert!(flags.sse);

        let json_only = parse_accept("application/json");
        assert!(json_only.json);
        assert!(!json_only.sse);
    }

    #[test]
    fn accept_without_json_fails() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/html"));
        let err = validate_headers(&headers, &[], "2024-11-05").unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn session_id_bounds_are_enforced() {
        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static(""));
        assert!(validate_headers(&headers, &[], "2024-11-05").is_err());

        let long = "s".repeat(300);
        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_str(&long).unwrap());
        assert!(validate_headers(&headers, &[], "2024-11-05").is_err());

        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static("sess-1"));
        assert!(validate_headers(&headers, &[], "2024-11-05").is_ok());
    }
}
