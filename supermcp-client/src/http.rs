//! HTTP transport client
//!
//! Speaks streamable HTTP by default: each JSON-RPC request is a POST, and
//! the server may answer either `application/json` or a `text/event-stream`
//! body. Both shapes decode into the same response path, so servers with
//! different reply framing are indistinguishable to callers. The legacy
//! HTTP+SSE transport (separate GET event channel plus POST message
//! endpoint) is used when the descriptor forces it or after the single
//! fallback attempt.
//!
//! Fallback rule: when a connect fails with one of the fixed markers that
//! indicate an older server — "Missing sessionId parameter", "HTTP 404",
//! "405 Method Not Allowed" — and no fallback has been attempted yet, the
//! half-built client is closed, `used_sse_fallback` is set, the transport
//! is rebuilt as HTTP+SSE and connect retries exactly once.

use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use supermcp_auth::{AuthError, AuthMode, CredentialStore, InvalidationScope, OAuthProvider};
use supermcp_config::{HttpSubtype, PackageDescriptor};

use crate::error::{ClientError, ClientResult};
use crate::pending::{self, PendingMap, PendingRequest};
use crate::protocol::{self, JsonRpcRequest, JsonRpcResponse, ListToolsPage, ServerMessage, ToolDef};
use crate::queue::{RequestQueue, HTTP_CONCURRENCY};
use crate::sse::SseBuffer;
use crate::timeouts;

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Health as reported by an HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpHealth {
    Ok,
    NeedsAuth,
    Error(String),
}

enum HttpConn {
    Streamable(StreamableConn),
    Sse(SseConn),
}

/// Client for one HTTP package
pub struct HttpClient {
    descriptor: PackageDescriptor,
    base_url: Url,
    queue: RequestQueue,
    conn: Mutex<Option<Arc<HttpConn>>>,
    used_sse_fallback: AtomicBool,
    auth_needed: AtomicBool,
    last_error: StdMutex<Option<String>>,
    store: Arc<CredentialStore>,
    closed: AtomicBool,
}

impl HttpClient {
    pub fn new(descriptor: PackageDescriptor, store: Arc<CredentialStore>) -> ClientResult<Self> {
        let base_url = descriptor
            .base_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| ClientError::ConnectionFailed {
                message: format!("package '{}' has no valid base_url", descriptor.id),
            })?;

        Ok(Self {
            descriptor,
            base_url,
            queue: RequestQueue::new(HTTP_CONCURRENCY),
            conn: Mutex::new(None),
            used_sse_fallback: AtomicBool::new(false),
            auth_needed: AtomicBool::new(false),
            last_error: StdMutex::new(None),
            store,
            closed: AtomicBool::new(false),
        })
    }

    pub fn package_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn has_pending_requests(&self) -> bool {
        self.queue.has_pending_requests()
    }

    pub fn used_sse_fallback(&self) -> bool {
        self.used_sse_fallback.load(Ordering::SeqCst)
    }

    /// Whether the descriptor declares OAuth
    pub fn requires_auth(&self) -> bool {
        self.descriptor.oauth
    }

    /// Whether stored tokens exist for this package
    pub fn is_authenticated(&self) -> bool {
        self.provider(AuthMode::RefreshOnly)
            .map(|p| p.has_tokens())
            .unwrap_or(true)
    }

    /// An OAuth provider for this package in the requested mode, when the
    /// descriptor declares OAuth.
    pub fn provider(&self, mode: AuthMode) -> Option<OAuthProvider> {
        if !self.descriptor.oauth {
            return None;
        }
        let static_client = self
            .descriptor
            .oauth_client_id
            .clone()
            .map(|id| (id, self.descriptor.oauth_client_secret.clone()));
        Some(OAuthProvider::new(
            self.descriptor.id.clone(),
            self.base_url.clone(),
            mode,
            self.store.clone(),
            static_client,
        ))
    }

    /// Bearer token for outbound requests; silent refresh only.
    async fn bearer(&self) -> ClientResult<Option<String>> {
        let Some(provider) = self.provider(AuthMode::RefreshOnly) else {
            return Ok(None);
        };
        if !provider.has_tokens() {
            // Authentication is an explicit user action; without tokens the
            // connection proceeds unauthenticated and the server's 401 tells
            // the user what to do.
            return Err(ClientError::AuthRequired {
                package: self.descriptor.id.clone(),
            });
        }
        match provider.ensure_token().await {
            Ok(token) => Ok(Some(token)),
            Err(AuthError::AuthenticationRequired { package }) => {
                Err(ClientError::AuthRequired { package })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Connect with the overall handshake timeout, negotiating the
    /// transport flavor.
    pub async fn connect(&self) -> ClientResult<()> {
        let deadline = timeouts::connect_timeout();
        let result = tokio::time::timeout(deadline, self.connect_inner())
            .await
            .unwrap_or_else(|_| {
                Err(ClientError::ConnectionFailed {
                    message: format!(
                        "connect to '{}' exceeded {:?}",
                        self.descriptor.id, deadline
                    ),
                })
            });

        match &result {
            Ok(()) => {
                self.auth_needed.store(false, Ordering::SeqCst);
                *self.last_error.lock().expect("last_error lock") = None;
            }
            Err(e) => {
                if e.is_auth_shaped() {
                    self.auth_needed.store(true, Ordering::SeqCst);
                }
                *self.last_error.lock().expect("last_error lock") = Some(e.to_string());
            }
        }
        result
    }

    async fn connect_inner(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        {
            let conn = self.conn.lock().await;
            if conn.is_some() {
                return Ok(());
            }
        }

        let force_sse = self.descriptor.http_subtype == Some(HttpSubtype::Sse)
            || self.used_sse_fallback();

        let first = if force_sse {
            self.handshake(true).await
        } else {
            match self.handshake(false).await {
                Err(e) if e.is_sse_fallback_shaped() && !self.used_sse_fallback() => {
                    tracing::info!(
                        package = %self.descriptor.id,
                        error = %e,
                        "streamable HTTP rejected; falling back to HTTP+SSE"
                    );
                    self.used_sse_fallback.store(true, Ordering::SeqCst);
                    self.handshake(true).await
                }
                other => other,
            }
        };

        let conn = first.map_err(|e| self.classify_connect_error(e))?;
        {
            let mut slot = self.conn.lock().await;
            if slot.is_some() {
                // A concurrent caller connected first; keep theirs.
                if let HttpConn::Sse(conn) = &conn {
                    conn.shutdown();
                }
            } else {
                *slot = Some(Arc::new(conn));
            }
        }
        tracing::info!(
            package = %self.descriptor.id,
            sse_fallback = self.used_sse_fallback(),
            "connected HTTP package"
        );
        Ok(())
    }

    fn classify_connect_error(&self, error: ClientError) -> ClientError {
        let message = error.to_string();
        if message.contains("Client ID mismatch") {
            self.store.invalidate(&self.descriptor.id, InvalidationScope::All);
            return ClientError::InvalidToken {
                package: self.descriptor.id.clone(),
                message,
            };
        }
        error
    }

    async fn handshake(&self, sse: bool) -> ClientResult<HttpConn> {
        let bearer = self.bearer().await?;
        let conn = if sse {
            HttpConn::Sse(
                SseConn::connect(
                    self.descriptor.id.clone(),
                    self.base_url.clone(),
                    self.descriptor.extra_headers.clone(),
                    bearer.clone(),
                )
                .await?,
            )
        } else {
            HttpConn::Streamable(StreamableConn::new(
                self.descriptor.id.clone(),
                self.base_url.clone(),
                self.descriptor.extra_headers.clone(),
            ))
        };

        let initialize = JsonRpcRequest::with_id(
            protocol::methods::INITIALIZE,
            Some(protocol::initialize_params()),
            Uuid::new_v4().to_string(),
        );
        let handshake = async {
            let response = self
                .dispatch(&conn, initialize, bearer.clone(), timeouts::connect_timeout(), false)
                .await?;
            pending::into_result(response)?;
            self.notify(&conn, protocol::methods::INITIALIZED, None, bearer.clone()).await
        };
        if let Err(e) = handshake.await {
            // A half-started SSE session keeps a reader task alive.
            if let HttpConn::Sse(conn) = &conn {
                conn.shutdown();
            }
            return Err(e);
        }
        Ok(conn)
    }

    async fn dispatch(
        &self,
        conn: &HttpConn,
        request: JsonRpcRequest,
        bearer: Option<String>,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<JsonRpcResponse> {
        match conn {
            HttpConn::Streamable(conn) => {
                conn.request(request, bearer, timeout, reset_on_progress).await
            }
            HttpConn::Sse(conn) => conn.request(request, bearer, timeout, reset_on_progress).await,
        }
    }

    async fn notify(
        &self,
        conn: &HttpConn,
        method: &str,
        params: Option<Value>,
        bearer: Option<String>,
    ) -> ClientResult<()> {
        let notification = JsonRpcRequest::notification(method, params);
        match conn {
            HttpConn::Streamable(conn) => conn.notify(notification, bearer).await,
            HttpConn::Sse(conn) => conn.notify(notification, bearer).await,
        }
    }

    /// The live connection, connecting lazily when none exists yet (a
    /// client installed unconnected after an auth-shaped failure, or one
    /// whose transport was discarded by `finish_oauth`).
    async fn ensure_conn(&self) -> ClientResult<Arc<HttpConn>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        if let Some(conn) = self.conn.lock().await.clone() {
            return Ok(conn);
        }
        self.connect().await?;
        self.conn.lock().await.clone().ok_or(ClientError::Closed)
    }

    /// List all tools, following upstream pagination.
    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDef>> {
        let timeout = timeouts::list_tools_timeout();
        self.queue
            .run(async {
                let conn = self.ensure_conn().await?;
                let bearer = self.bearer().await?;
                let mut tools = Vec::new();
                let mut cursor: Option<String> = None;
                loop {
                    let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
                    let request = JsonRpcRequest::with_id(
                        protocol::methods::TOOLS_LIST,
                        params,
                        Uuid::new_v4().to_string(),
                    );
                    let response = self
                        .dispatch(&conn, request, bearer.clone(), timeout, false)
                        .await?;
                    let page: ListToolsPage = serde_json::from_value(pending::into_result(response)?)?;
                    tools.extend(page.tools);
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                Ok(tools)
            })
            .await
    }

    /// Call a tool with a progress-resetting deadline.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> ClientResult<Value> {
        self.queue
            .run(async {
                let conn = self.ensure_conn().await?;
                let bearer = self.bearer().await?;
                let id = Uuid::new_v4().to_string();
                let params = protocol::call_tool_params(tool, arguments, &id);
                let request =
                    JsonRpcRequest::with_id(protocol::methods::TOOLS_CALL, Some(params), id);
                let response = self.dispatch(&conn, request, bearer, timeout, true).await?;
                pending::into_result(response)
            })
            .await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> ClientResult<Value> {
        let timeout = timeouts::list_tools_timeout();
        self.queue
            .run(async {
                let conn = self.ensure_conn().await?;
                let bearer = self.bearer().await?;
                let request = JsonRpcRequest::with_id(
                    protocol::methods::RESOURCES_READ,
                    Some(serde_json::json!({ "uri": uri })),
                    Uuid::new_v4().to_string(),
                );
                let response = self.dispatch(&conn, request, bearer, timeout, false).await?;
                pending::into_result(response)
            })
            .await
    }

    /// Health as seen from the connection state
    pub async fn health(&self) -> HttpHealth {
        if self.closed.load(Ordering::SeqCst) {
            return HttpHealth::Error("client closed".to_string());
        }
        if self.conn.lock().await.is_some() {
            return HttpHealth::Ok;
        }
        if self.auth_needed.load(Ordering::SeqCst) {
            return HttpHealth::NeedsAuth;
        }
        let last = self.last_error.lock().expect("last_error lock").clone();
        HttpHealth::Error(last.unwrap_or_else(|| "not connected".to_string()))
    }

    /// Complete the browser flow: exchange the code, then discard the
    /// half-started transport so the next connect uses the fresh tokens.
    pub async fn finish_oauth(&self, code: &str) -> ClientResult<()> {
        let provider = self
            .provider(AuthMode::Interactive)
            .ok_or_else(|| ClientError::AuthRequired {
                package: self.descriptor.id.clone(),
            })?;
        provider.exchange_code(code).await?;

        let dropped = self.conn.lock().await.take();
        if let Some(conn) = dropped {
            if let HttpConn::Sse(conn) = conn.as_ref() {
                conn.shutdown();
            }
        }
        self.auth_needed.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Close the client; pending queue items fail with "client closed".
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.clear();
        if let Some(conn) = self.conn.lock().await.take() {
            if let HttpConn::Sse(conn) = conn.as_ref() {
                conn.shutdown();
            }
        }
        tracing::info!(package = %self.descriptor.id, "closed HTTP package");
    }
}

/// Streamable HTTP connection: one POST per request
struct StreamableConn {
    package: String,
    endpoint: Url,
    headers: HashMap<String, String>,
    http: reqwest::Client,
    session_id: StdMutex<Option<String>>,
}

impl StreamableConn {
    fn new(package: String, endpoint: Url, headers: HashMap<String, String>) -> Self {
        Self {
            package,
            endpoint,
            headers,
            http: reqwest::Client::new(),
            session_id: StdMutex::new(None),
        }
    }

    fn builder(&self, bearer: &Option<String>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .header("Accept", "application/json, text/event-stream");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(session) = self.session_id.lock().expect("session lock").clone() {
            builder = builder.header(SESSION_HEADER, session);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn request(
        &self,
        request: JsonRpcRequest,
        bearer: Option<String>,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<JsonRpcResponse> {
        let expected_id = request
            .id
            .clone()
            .map(|id| match id {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .ok_or_else(|| ClientError::Protocol {
                message: "request without id".to_string(),
            })?;

        let response = tokio::time::timeout(timeout, self.builder(&bearer).json(&request).send())
            .await
            .map_err(|_| ClientError::Timeout { timeout })?
            .map_err(|e| ClientError::Transport {
                message: format!("POST to {} failed: {}", self.endpoint, e),
            })?;

        let response = self.check_status(response).await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().expect("session lock") = Some(session.to_string());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Servers answer either a plain JSON body or an SSE stream; both
        // decode to the same response type here.
        if content_type.starts_with("text/event-stream") {
            self.read_stream_response(response, &expected_id, timeout, reset_on_progress)
                .await
        } else {
            let body = tokio::time::timeout(timeout, response.bytes())
                .await
                .map_err(|_| ClientError::Timeout { timeout })?
                .map_err(|e| ClientError::Transport {
                    message: format!("failed to read response body: {}", e),
                })?;
            Ok(serde_json::from_slice(&body)?)
        }
    }

    async fn read_stream_response(
        &self,
        response: reqwest::Response,
        expected_id: &str,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<JsonRpcResponse> {
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();
        let mut deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in buffer.push(&bytes) {
                            let message = match ServerMessage::parse(&event.data) {
                                Ok(message) => message,
                                Err(e) => {
                                    tracing::warn!(package = %self.package, error = %e, "unparseable SSE payload");
                                    continue;
                                }
                            };
                            if reset_on_progress
                                && message.progress_token().as_deref() == Some(expected_id)
                            {
                                deadline = Instant::now() + timeout;
                                continue;
                            }
                            if let ServerMessage::Response(response) = message {
                                if response.id_as_string().as_deref() == Some(expected_id) {
                                    return Ok(response);
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ClientError::Transport {
                            message: format!("SSE stream error: {}", e),
                        });
                    }
                    None => {
                        return Err(ClientError::Protocol {
                            message: "SSE stream ended without a response".to_string(),
                        });
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ClientError::Timeout { timeout });
                }
            }
        }
    }

    async fn notify(&self, notification: JsonRpcRequest, bearer: Option<String>) -> ClientResult<()> {
        let response = self
            .builder(&bearer)
            .json(&notification)
            .send()
            .await
            .map_err(|e| ClientError::Transport {
                message: format!("POST to {} failed: {}", self.endpoint, e),
            })?;
        self.check_status(response).await.map(|_| ())
    }

    async fn check_status(&self, response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(ClientError::Unauthorized {
                package: self.package.clone(),
            }),
            404 => Err(ClientError::ConnectionFailed {
                message: format!("HTTP 404 Not Found from {}", self.endpoint),
            }),
            405 => Err(ClientError::ConnectionFailed {
                message: format!("HTTP 405 Method Not Allowed from {}", self.endpoint),
            }),
            _ => Err(ClientError::ConnectionFailed {
                message: format!("HTTP {} from {}: {}", status.as_u16(), self.endpoint, body),
            }),
        }
    }
}

/// Legacy HTTP+SSE connection: long-lived GET event channel plus a POST
/// message endpoint announced by the server's `endpoint` event.
struct SseConn {
    package: String,
    post_url: Url,
    headers: HashMap<String, String>,
    http: reqwest::Client,
    pending: PendingMap,
    reader: tokio::task::JoinHandle<()>,
}

impl SseConn {
    async fn connect(
        package: String,
        base_url: Url,
        headers: HashMap<String, String>,
        bearer: Option<String>,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::new();

        let mut builder = http
            .get(base_url.clone())
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        if let Some(token) = &bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| ClientError::ConnectionFailed {
            message: format!("failed to open SSE channel to {}: {}", base_url, e),
        })?;
        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ClientError::Unauthorized { package });
            }
            return Err(ClientError::ConnectionFailed {
                message: format!("SSE channel to {} answered HTTP {}", base_url, status.as_u16()),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();

        // The first event names the POST endpoint for this session.
        let post_url = loop {
            let Some(chunk) = stream.next().await else {
                return Err(ClientError::ConnectionFailed {
                    message: "SSE channel closed before announcing an endpoint".to_string(),
                });
            };
            let bytes = chunk.map_err(|e| ClientError::ConnectionFailed {
                message: format!("SSE channel error: {}", e),
            })?;
            let endpoint = buffer.push(&bytes).into_iter().find_map(|event| {
                (event.event.as_deref() == Some("endpoint")).then_some(event.data)
            });
            if let Some(endpoint) = endpoint {
                break base_url.join(endpoint.trim()).map_err(|e| ClientError::ConnectionFailed {
                    message: format!("invalid endpoint from SSE channel: {}", e),
                })?;
            }
        };

        let pending = pending::new_pending_map();
        let reader = {
            let package = package.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(chunk) = stream.next().await {
                    let Ok(bytes) = chunk else { break };
                    for event in buffer.push(&bytes) {
                        match ServerMessage::parse(&event.data) {
                            Ok(message) => pending::route_message(&package, message, &pending),
                            Err(e) => {
                                tracing::warn!(package = %package, error = %e, "unparseable SSE payload");
                            }
                        }
                    }
                }
                pending.lock().expect("pending lock").clear();
                tracing::debug!(package = %package, "SSE channel closed");
            })
        };

        tracing::debug!(package = %package, endpoint = %post_url, "HTTP+SSE session established");
        Ok(Self {
            package,
            post_url,
            headers,
            http,
            pending,
            reader,
        })
    }

    fn builder(&self, bearer: &Option<String>) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(self.post_url.clone());
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn request(
        &self,
        request: JsonRpcRequest,
        bearer: Option<String>,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<JsonRpcResponse> {
        let id = request
            .id
            .clone()
            .map(|id| match id {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .ok_or_else(|| ClientError::Protocol {
                message: "request without id".to_string(),
            })?;

        let (response_tx, response_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let _progress_keepalive = progress_tx.clone();
        self.pending.lock().expect("pending lock").insert(
            id.clone(),
            PendingRequest {
                response: response_tx,
                progress: reset_on_progress.then_some(progress_tx),
            },
        );

        let sent = self.builder(&bearer).json(&request).send().await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.pending.lock().expect("pending lock").remove(&id);
                return Err(ClientError::Transport {
                    message: format!("POST to {} failed: {}", self.post_url, e),
                });
            }
        };
        let status = response.status();
        if !status.is_success() {
            self.pending.lock().expect("pending lock").remove(&id);
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ClientError::Unauthorized {
                    package: self.package.clone(),
                });
            }
            return Err(ClientError::Transport {
                message: format!("HTTP {} from {}: {}", status.as_u16(), self.post_url, body),
            });
        }

        pending::await_response(response_rx, progress_rx, timeout, reset_on_progress, &self.pending, &id)
            .await
    }

    async fn notify(&self, notification: JsonRpcRequest, bearer: Option<String>) -> ClientResult<()> {
        let response = self
            .builder(&bearer)
            .json(&notification)
            .send()
            .await
            .map_err(|e| ClientError::Transport {
                message: format!("POST to {} failed: {}", self.post_url, e),
            })?;
        if !response.status().is_success() {
            return Err(ClientError::Transport {
                message: format!(
                    "HTTP {} from {} for notification",
                    response.status().as_u16(),
                    self.post_url
                ),
            });
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.reader.abort();
        self.pending.lock().expect("pending lock").clear();
    }
}
