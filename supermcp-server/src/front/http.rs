//! HTTP front end
//!
//! `GET /health` is open. `POST /mcp` carries the MCP JSON-RPC traffic and
//! enforces a Host-header allowlist to mitigate DNS rebinding: a browser
//! lured to an attacker's hostname resolving to 127.0.0.1 would still send
//! that hostname in the Host header. `GET /api/tools` is the bulk export
//! with an ETag combining the catalog ETag and the user-disabled hash.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use std::net::SocketAddr;
use std::sync::Arc;

use supermcp_client::JsonRpcRequest;

use crate::service::McpService;

/// Hosts allowed to reach the MCP route
const ALLOWED_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

struct AppState {
    service: McpService,
}

/// Build the axum application
pub fn app(service: McpService) -> AxumRouter {
    let state = Arc::new(AppState { service });
    AxumRouter::new()
        .route("/health", get(health))
        .route("/mcp", post(mcp).get(mcp_get))
        .route("/api/tools", get(api_tools))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on the given address until the process exits.
pub async fn serve(service: McpService, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving MCP over HTTP");
    axum::serve(listener, app(service)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn host_allowed(headers: &HeaderMap) -> bool {
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    // Strip any port suffix; the bracketed IPv6 form keeps its brackets.
    let bare = if let Some(rest) = host.strip_prefix('[') {
        rest.split_once(']')
            .map(|(addr, _)| format!("[{}]", addr))
            .unwrap_or_else(|| host.to_string())
    } else {
        host.split(':').next().unwrap_or(host).to_string()
    };
    ALLOWED_HOSTS.contains(&bare.as_str())
}

/// The server pushes nothing outside a POST exchange, so the optional
/// streamable-HTTP GET channel is declined; clients fall back to plain
/// POST responses. The Host gate still applies.
async fn mcp_get(headers: HeaderMap) -> Response {
    if !host_allowed(&headers) {
        return (StatusCode::FORBIDDEN, "Host not allowed").into_response();
    }
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        "listening channel not supported; POST JSON-RPC requests instead",
    )
        .into_response()
}

async fn mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    if !host_allowed(&headers) {
        tracing::warn!("rejected /mcp request with disallowed Host header");
        return (StatusCode::FORBIDDEN, "Host not allowed").into_response();
    }

    match state.service.handle(request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn api_tools(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (body, etag) = state.service.router().export_tools().await;
    let quoted = format!("\"{}\"", etag);

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if if_none_match == quoted {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    ([(header::ETAG, quoted)], Json(body)).into_response()
}
