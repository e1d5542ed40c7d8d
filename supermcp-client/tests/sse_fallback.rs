//! SSE fallback negotiation against an in-process upstream
//!
//! The mock upstream only speaks the older HTTP+SSE protocol: POSTs to the
//! MCP route answer 405, the GET route serves the event channel with an
//! `endpoint` event, and the message endpoint feeds responses back through
//! the channel.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use supermcp_auth::CredentialStore;
use supermcp_client::{HttpClient, HttpHealth, JsonRpcRequest, JsonRpcResponse};
use supermcp_config::{HttpSubtype, PackageDescriptor, TransportKind, Visibility};

#[derive(Default)]
struct MockUpstream {
    events: Mutex<Option<mpsc::Sender<Event>>>,
}

async fn post_mcp() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed")
}

async fn get_mcp(
    State(state): State<Arc<MockUpstream>>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(32);
    *state.events.lock().unwrap() = Some(tx);

    let endpoint = stream::iter(vec![Ok(Event::default().event("endpoint").data("/message"))]);
    let rest = ReceiverStream::new(rx).map(Ok);
    Sse::new(endpoint.chain(rest))
}

async fn post_message(
    State(state): State<Arc<MockUpstream>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = match request.method.as_str() {
        "initialize" => Some(serde_json::json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "serverInfo": {"name": "mock-sse", "version": "0"}
        })),
        "tools/list" => Some(serde_json::json!({
            "tools": [{"name": "legacy_tool", "description": "Served over SSE", "inputSchema": {"type": "object"}}]
        })),
        _ => None,
    };

    if let (Some(result), Some(id)) = (result, request.id.clone()) {
        let response = JsonRpcResponse::success(result, Some(id));
        let sender = state.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            let payload = serde_json::to_string(&response).unwrap();
            tokio::spawn(async move {
                let _ = sender.send(Event::default().data(payload)).await;
            });
        }
    }
    StatusCode::ACCEPTED
}

async fn spawn_upstream() -> String {
    let state = Arc::new(MockUpstream::default());
    let app = Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp))
        .route("/message", post(post_message))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/mcp", addr)
}

fn descriptor(url: &str) -> PackageDescriptor {
    PackageDescriptor {
        id: "legacy".to_string(),
        name: "legacy".to_string(),
        description: None,
        transport: TransportKind::Http,
        command: None,
        args: Vec::new(),
        env: HashMap::new(),
        cwd: None,
        base_url: Some(url.to_string()),
        http_subtype: Some(HttpSubtype::Streamable),
        extra_headers: HashMap::new(),
        oauth: false,
        oauth_client_id: None,
        oauth_client_secret: None,
        timeout_ms: None,
        visibility: Visibility::Default,
    }
}

fn credential_store(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::with_root(dir.path().join("tokens")))
}

#[tokio::test]
async fn test_405_triggers_single_sse_fallback() {
    let url = spawn_upstream().await;
    let dir = tempfile::TempDir::new().unwrap();

    let client = HttpClient::new(descriptor(&url), credential_store(&dir)).unwrap();
    assert!(!client.used_sse_fallback());

    client.connect().await.unwrap();
    assert!(client.used_sse_fallback());
    assert_eq!(client.health().await, HttpHealth::Ok);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "legacy_tool");

    client.close().await;
}

#[tokio::test]
async fn test_connect_failure_without_fallback_marker_surfaces() {
    // Nothing is listening here; a refused connection is not one of the
    // fallback markers and must surface as a normal failure.
    let dir = tempfile::TempDir::new().unwrap();
    let client = HttpClient::new(
        descriptor("http://127.0.0.1:9/mcp"),
        credential_store(&dir),
    )
    .unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(!client.used_sse_fallback(), "fallback fired for {err}");
}

#[tokio::test]
async fn test_unauthorized_upstream_marks_needs_auth() {
    let app = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::UNAUTHORIZED, "Unauthorized") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::TempDir::new().unwrap();
    let client = HttpClient::new(
        descriptor(&format!("http://{}/mcp", addr)),
        credential_store(&dir),
    )
    .unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(err.is_auth_shaped());
    assert_eq!(client.health().await, HttpHealth::NeedsAuth);
}
