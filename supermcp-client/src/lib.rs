//! Upstream MCP clients for super-mcp
//!
//! One client per package, owned by the registry. The stdio client runs a
//! child process behind a serial request queue; the HTTP client speaks
//! streamable HTTP with a single SSE fallback behind a bounded queue, with
//! OAuth providers wired in for packages that need them.

pub mod client;
pub mod error;
pub mod http;
mod pending;
pub mod protocol;
pub mod queue;
pub mod sse;
pub mod stdio;
pub mod timeouts;

pub use client::{Health, McpClient};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpHealth};
pub use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ServerMessage, ToolDef,
    JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
pub use queue::{RequestQueue, HTTP_CONCURRENCY, STDIO_CONCURRENCY};
pub use stdio::{kill_process_tree, StdioClient};
