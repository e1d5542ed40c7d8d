//! Loopback OAuth callback server
//!
//! Binds `127.0.0.1` only and serves `GET /oauth/callback`. A callback with
//! a missing or mismatched state is answered with an error page but never
//! resolves the waiting flow; state comparison is constant-time. Responses
//! carry `Cache-Control: no-store` and `Referrer-Policy: no-referrer`.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;

use crate::error::{AuthError, AuthResult};
use crate::ports::CALLBACK_HOST;

/// Default wait for the user to complete the browser flow
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay between signaling shutdown and force-closing keep-alive
/// connections, so the browser finishes reading the response page.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(150);

type CallbackSender = oneshot::Sender<Result<String, AuthError>>;

struct CallbackShared {
    expected_state: String,
    sender: Mutex<Option<CallbackSender>>,
}

impl CallbackShared {
    fn resolve(&self, outcome: Result<String, AuthError>) {
        if let Some(sender) = self.sender.lock().expect("callback sender lock").take() {
            let _ = sender.send(outcome);
        }
    }
}

/// Compare two state nonces without leaking timing. Hashing both sides
/// first equalizes lengths so the comparison itself is fixed-size.
fn states_match(expected: &str, presented: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    expected.ct_eq(&presented).into()
}

async fn handle_callback(
    State(shared): State<Arc<CallbackShared>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        shared.resolve(Err(AuthError::AuthorizationDenied { error: description.clone() }));
        return html_page(&error_page(&description));
    }

    let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
        tracing::warn!("OAuth callback missing code or state; ignoring");
        return html_page(&error_page("The authorization response was incomplete."));
    };

    if !states_match(&shared.expected_state, state) {
        tracing::warn!("OAuth callback state mismatch; ignoring");
        return html_page(&error_page("The authorization response could not be verified."));
    }

    shared.resolve(Ok(code.clone()));
    html_page(&success_page())
}

fn html_page(body: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
            (header::REFERRER_POLICY, "no-referrer"),
        ],
        body.to_string(),
    )
        .into_response()
}

fn branding() -> (String, String, u32, Option<String>) {
    let app_name = std::env::var("SUPER_MCP_APP_NAME").unwrap_or_else(|_| "super-mcp".to_string());
    let color = std::env::var("SUPER_MCP_PRIMARY_COLOR").unwrap_or_else(|_| "#4f46e5".to_string());
    let countdown = std::env::var("SUPER_MCP_COUNTDOWN_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let deep_link = std::env::var("SUPER_MCP_DEEP_LINK_URL").ok();
    (app_name, color, countdown, deep_link)
}

fn success_page() -> String {
    let (app_name, color, countdown, deep_link) = branding();
    let deep_link_html = deep_link
        .map(|url| format!(r#"<p><a href="{}">Return to {}</a></p>"#, url, app_name))
        .unwrap_or_default();
    format!(
        r#"<!doctype html><html><head><title>{app_name} — authorized</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 4rem;">
<h1 style="color: {color};">Authorization complete</h1>
<p>You can close this window. It closes itself in <span id="n">{countdown}</span>s.</p>
{deep_link_html}
<script>
let n = {countdown};
const el = document.getElementById("n");
const t = setInterval(() => {{ n -= 1; el.textContent = n; if (n <= 0) {{ clearInterval(t); window.close(); }} }}, 1000);
</script>
</body></html>"#
    )
}

fn error_page(message: &str) -> String {
    let (app_name, color, _, _) = branding();
    format!(
        r#"<!doctype html><html><head><title>{app_name} — authorization failed</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 4rem;">
<h1 style="color: {color};">Authorization failed</h1>
<p>{message}</p>
<p>You can close this window and retry from the client.</p>
</body></html>"#
    )
}

/// A running callback server awaiting exactly one valid callback
pub struct CallbackServer {
    port: u16,
    receiver: oneshot::Receiver<Result<String, AuthError>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl CallbackServer {
    /// Bind the loopback listener and start serving
    pub async fn bind(port: u16, expected_state: String) -> AuthResult<Self> {
        let (sender, receiver) = oneshot::channel();
        let shared = Arc::new(CallbackShared {
            expected_state,
            sender: Mutex::new(Some(sender)),
        });

        let router = Router::new()
            .route("/oauth/callback", get(handle_callback))
            .with_state(shared);

        let listener = tokio::net::TcpListener::bind((CALLBACK_HOST, port))
            .await
            .map_err(|source| AuthError::CallbackBind { port, source })?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "OAuth callback server error");
            }
        });

        tracing::debug!(port, "OAuth callback server listening");
        Ok(Self {
            port,
            receiver,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the authorization code, then stop the server. The server is
    /// stopped on every path, including timeout and denial.
    pub async fn wait(mut self, timeout: Duration) -> AuthResult<String> {
        let outcome = tokio::select! {
            received = &mut self.receiver => match received {
                Ok(outcome) => outcome,
                Err(_) => Err(AuthError::CallbackTimeout { timeout }),
            },
            _ = tokio::time::sleep(timeout) => Err(AuthError::CallbackTimeout { timeout }),
        };
        self.stop().await;
        outcome
    }

    /// Signal graceful shutdown, give keep-alive connections a short drain
    /// window, then force-close by aborting the serve task.
    async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        self.task.abort();
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}
