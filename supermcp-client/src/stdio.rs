//! Stdio transport client
//!
//! Spawns the configured command and speaks line-delimited JSON-RPC over
//! the child's stdin/stdout. All requests pass through a serial queue; a
//! background reader task routes responses by id and feeds progress
//! notifications back into in-flight calls.
//!
//! Closing is the delicate part. On Unix, killing the parent first
//! reparents descendants to pid 1 and they become unreachable through the
//! parent-of relation, so the close protocol is: clear the queue, capture
//! the root pid, enumerate descendants leaves-first (depth-limited), kill
//! each descendant, kill the root, and only then let the transport shut
//! down. On Windows a single recursive taskkill covers the tree.

use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use supermcp_config::PackageDescriptor;

use crate::error::{ClientError, ClientResult};
use crate::pending::{self, PendingMap, PendingRequest};
use crate::protocol::{self, JsonRpcRequest, ListToolsPage, ServerMessage, ToolDef};
use crate::queue::{RequestQueue, STDIO_CONCURRENCY};
use crate::timeouts;

/// Maximum depth when enumerating process-tree descendants
const MAX_KILL_DEPTH: usize = 20;

struct StdioConn {
    child: Child,
    root_pid: Option<u32>,
    stdin: BufWriter<ChildStdin>,
    pending: PendingMap,
    reader: tokio::task::JoinHandle<()>,
}

/// Client for one stdio package
pub struct StdioClient {
    descriptor: PackageDescriptor,
    queue: RequestQueue,
    conn: Mutex<Option<StdioConn>>,
    closed: AtomicBool,
}

impl StdioClient {
    pub fn new(descriptor: PackageDescriptor) -> Self {
        Self {
            descriptor,
            queue: RequestQueue::new(STDIO_CONCURRENCY),
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn package_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn has_pending_requests(&self) -> bool {
        self.queue.has_pending_requests()
    }

    /// Spawn the child and run the MCP initialize handshake.
    pub async fn connect(&self) -> ClientResult<()> {
        let deadline = timeouts::connect_timeout();
        tokio::time::timeout(deadline, self.connect_inner())
            .await
            .map_err(|_| ClientError::ConnectionFailed {
                message: format!(
                    "initialize handshake for '{}' exceeded {:?}",
                    self.descriptor.id, deadline
                ),
            })?
    }

    async fn connect_inner(&self) -> ClientResult<()> {
        {
            let conn = self.conn.lock().await;
            if conn.is_some() {
                return Ok(());
            }
        }

        let command = self.descriptor.command.clone().ok_or_else(|| {
            ClientError::ConnectionFailed {
                message: format!("package '{}' has no command", self.descriptor.id),
            }
        })?;

        let mut cmd = Command::new(&command);
        cmd.args(&self.descriptor.args)
            .envs(&self.descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Clients dropped without an explicit close (failed connects)
            // must not leave the child running.
            .kill_on_drop(true);
        if let Some(cwd) = &self.descriptor.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| {
            let hint = if source.kind() == std::io::ErrorKind::NotFound {
                format!("; is '{}' installed and on PATH?", command)
            } else {
                String::new()
            };
            ClientError::Spawn {
                command: command.clone(),
                hint,
                source,
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ClientError::Transport {
            message: "failed to get stdin handle".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ClientError::Transport {
            message: "failed to get stdout handle".to_string(),
        })?;

        // Forward the child's stderr into our logs at debug level.
        if let Some(stderr) = child.stderr.take() {
            let package = self.descriptor.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(package = %package, "upstream stderr: {}", line);
                }
            });
        }

        let pending = pending::new_pending_map();
        let reader = spawn_reader(self.descriptor.id.clone(), stdout, pending.clone());

        let root_pid = child.id();
        {
            let mut conn = self.conn.lock().await;
            *conn = Some(StdioConn {
                child,
                root_pid,
                stdin: BufWriter::new(stdin),
                pending,
                reader,
            });
        }

        tracing::info!(package = %self.descriptor.id, command = %command, pid = ?root_pid, "spawned stdio package");

        // Initialize handshake, then the initialized notification.
        self.request(
            protocol::methods::INITIALIZE,
            Some(protocol::initialize_params()),
            timeouts::connect_timeout(),
            false,
        )
        .await?;
        self.send_notification(protocol::methods::INITIALIZED, None).await?;

        Ok(())
    }

    /// List all tools, following upstream pagination.
    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDef>> {
        let timeout = timeouts::list_tools_timeout();
        self.queue
            .run(async {
                let mut tools = Vec::new();
                let mut cursor: Option<String> = None;
                loop {
                    let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
                    let result = self
                        .request(protocol::methods::TOOLS_LIST, params, timeout, false)
                        .await?;
                    let page: ListToolsPage = serde_json::from_value(result)?;
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
                let id = Uuid::new_v4().to_string();
                let params = protocol::call_tool_params(tool, arguments, &id);
                self.request_with_id(protocol::methods::TOOLS_CALL, Some(params), &id, timeout, true)
                    .await
            })
            .await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> ClientResult<Value> {
        let timeout = timeouts::list_tools_timeout();
        self.queue
            .run(async {
                self.request(
                    protocol::methods::RESOURCES_READ,
                    Some(serde_json::json!({ "uri": uri })),
                    timeout,
                    false,
                )
                .await
            })
            .await
    }

    /// Liveness check against the child process
    pub async fn health(&self) -> ClientResult<()> {
        let mut conn = self.conn.lock().await;
        match conn.as_mut() {
            None => Err(ClientError::ConnectionFailed {
                message: "not connected".to_string(),
            }),
            Some(conn) => match conn.child.try_wait() {
                Ok(None) => Ok(()),
                Ok(Some(status)) => Err(ClientError::ConnectionFailed {
                    message: format!("child process exited with {}", status),
                }),
                Err(e) => Err(ClientError::Transport {
                    message: format!("failed to poll child process: {}", e),
                }),
            },
        }
    }

    /// Close the client: clear the queue, kill the process tree leaves
    /// first, then tear down the transport.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.clear();

        let conn = self.conn.lock().await.take();
        let Some(mut conn) = conn else { return };

        if let Some(root_pid) = conn.root_pid {
            kill_process_tree(root_pid).await;
        }

        conn.reader.abort();
        conn.pending.lock().expect("pending lock").clear();
        let _ = conn.stdin.shutdown().await;
        match conn.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                let _ = conn.child.start_kill();
                let _ = conn.child.wait().await;
            }
        }

        tracing::info!(package = %self.descriptor.id, "closed stdio package");
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<Value> {
        let id = Uuid::new_v4().to_string();
        self.request_with_id(method, params, &id, timeout, reset_on_progress).await
    }

    async fn request_with_id(
        &self,
        method: &str,
        params: Option<Value>,
        id: &str,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> ClientResult<Value> {
        let request = JsonRpcRequest::with_id(method, params, id);
        let (response_tx, response_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        // Held for the whole wait so the progress channel stays open even
        // after the pending entry is consumed.
        let _progress_keepalive = progress_tx.clone();

        let pending = {
            let mut conn = self.conn.lock().await;
            let conn = conn.as_mut().ok_or(ClientError::Closed)?;
            conn.pending.lock().expect("pending lock").insert(
                id.to_string(),
                PendingRequest {
                    response: response_tx,
                    progress: reset_on_progress.then_some(progress_tx),
                },
            );

            let line = serde_json::to_string(&request)?;
            if let Err(e) = write_line(&mut conn.stdin, &line).await {
                conn.pending.lock().expect("pending lock").remove(id);
                return Err(e);
            }
            conn.pending.clone()
        };

        let response =
            pending::await_response(response_rx, progress_rx, timeout, reset_on_progress, &pending, id)
                .await?;
        pending::into_result(response)
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let notification = JsonRpcRequest::notification(method, params);
        let line = serde_json::to_string(&notification)?;
        let mut conn = self.conn.lock().await;
        let conn = conn.as_mut().ok_or(ClientError::Closed)?;
        write_line(&mut conn.stdin, &line).await
    }
}

async fn write_line(stdin: &mut BufWriter<ChildStdin>, line: &str) -> ClientResult<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

fn spawn_reader(
    package: String,
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match ServerMessage::parse(line) {
                        Ok(message) => pending::route_message(&package, message, &pending),
                        Err(e) => {
                            tracing::warn!(package = %package, error = %e, "unparseable line from upstream");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(package = %package, error = %e, "error reading upstream stdout");
                    break;
                }
            }
        }
        // EOF: dropping the senders fails every in-flight request.
        pending.lock().expect("pending lock").clear();
        tracing::debug!(package = %package, "upstream stdout closed");
    })
}

/// Kill a process and all of its descendants, leaves first.
///
/// Errors indicating "no such process" are ignored; the tree may be
/// winding down on its own while we sweep it.
pub async fn kill_process_tree(root_pid: u32) {
    #[cfg(unix)]
    {
        let mut order = Vec::new();
        collect_descendants(root_pid, 0, &mut order).await;
        // Post-order: leaves come before their parents.
        for pid in order {
            send_sigkill(pid);
        }
        send_sigkill(root_pid);
    }

    #[cfg(windows)]
    {
        let result = Command::new("taskkill")
            .args(["/pid", &root_pid.to_string(), "/f", "/t"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            tracing::warn!(pid = root_pid, error = %e, "taskkill failed");
        }
    }
}

#[cfg(unix)]
fn collect_descendants<'a>(
    pid: u32,
    depth: usize,
    order: &'a mut Vec<u32>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if depth >= MAX_KILL_DEPTH {
            return;
        }
        let children = list_children(pid).await;
        for child in children {
            collect_descendants(child, depth + 1, order).await;
            order.push(child);
        }
    })
}

#[cfg(unix)]
async fn list_children(pid: u32) -> Vec<u32> {
    let output = Command::new("pgrep")
        .arg("-P")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .output()
        .await;
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(unix)]
fn send_sigkill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to SIGKILL process"),
    }
}
