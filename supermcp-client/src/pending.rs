//! In-flight request bookkeeping shared by the pipe and SSE transports
//!
//! Both transports receive responses on a channel decoupled from the
//! sender: a reader task routes each inbound message to the waiter by
//! request id, and progress notifications reschedule the waiter's deadline
//! when the call opted in.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::protocol::{JsonRpcResponse, ServerMessage};

pub(crate) struct PendingRequest {
    pub response: oneshot::Sender<JsonRpcResponse>,
    pub progress: Option<mpsc::UnboundedSender<()>>,
}

pub(crate) type PendingMap = Arc<StdMutex<HashMap<String, PendingRequest>>>;

pub(crate) fn new_pending_map() -> PendingMap {
    Arc::new(StdMutex::new(HashMap::new()))
}

/// Route one inbound message to its waiter.
pub(crate) fn route_message(package: &str, message: ServerMessage, pending: &PendingMap) {
    if let Some(token) = message.progress_token() {
        let pending = pending.lock().expect("pending lock");
        if let Some(entry) = pending.get(&token) {
            if let Some(progress) = &entry.progress {
                let _ = progress.send(());
            }
        }
        return;
    }

    match message {
        ServerMessage::Response(response) => {
            let Some(id) = response.id_as_string() else {
                tracing::warn!(package, "response without id from upstream");
                return;
            };
            let entry = pending.lock().expect("pending lock").remove(&id);
            match entry {
                Some(entry) => {
                    let _ = entry.response.send(response);
                }
                None => {
                    tracing::debug!(package, id = %id, "response for unknown request id");
                }
            }
        }
        ServerMessage::Notification(notification) => {
            tracing::debug!(package, method = %notification.method, "upstream notification");
        }
    }
}

/// Wait for a routed response, optionally rescheduling the deadline on
/// every progress notification. On timeout the pending entry is removed so
/// a late response is discarded instead of resolving a dead waiter.
pub(crate) async fn await_response(
    mut response_rx: oneshot::Receiver<JsonRpcResponse>,
    mut progress_rx: mpsc::UnboundedReceiver<()>,
    timeout: Duration,
    reset_on_progress: bool,
    pending: &PendingMap,
    id: &str,
) -> ClientResult<JsonRpcResponse> {
    let mut deadline = Instant::now() + timeout;
    loop {
        tokio::select! {
            received = &mut response_rx => {
                return received.map_err(|_| ClientError::Transport {
                    message: "upstream closed before responding".to_string(),
                });
            }
            progress = progress_rx.recv(), if reset_on_progress => {
                if progress.is_some() {
                    deadline = Instant::now() + timeout;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                pending.lock().expect("pending lock").remove(id);
                return Err(ClientError::Timeout { timeout });
            }
        }
    }
}

/// Unwrap a JSON-RPC response into its result value.
pub(crate) fn into_result(response: JsonRpcResponse) -> ClientResult<Value> {
    if let Some(error) = response.error {
        return Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| ClientError::Protocol {
        message: "response carried neither result nor error".to_string(),
    })
}
