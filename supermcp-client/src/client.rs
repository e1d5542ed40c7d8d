//! Unified client over both transports
//!
//! The capability set shared by the transports is expressed as one sum
//! type rather than a trait object: callers match on the variant for the
//! transport-specific extras (OAuth wiring, SSE fallback state) and use
//! the shared methods for everything else.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use supermcp_auth::CredentialStore;
use supermcp_config::{PackageDescriptor, TransportKind};

use crate::error::{ClientError, ClientResult};
use crate::http::{HttpClient, HttpHealth};
use crate::protocol::ToolDef;
use crate::stdio::StdioClient;

/// Health of one client, as surfaced to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Ok,
    NeedsAuth,
    Error(String),
}

/// One upstream client, stdio or HTTP
pub enum McpClient {
    Stdio(StdioClient),
    Http(HttpClient),
}

impl McpClient {
    /// Build the client matching the descriptor's transport.
    pub fn for_descriptor(
        descriptor: PackageDescriptor,
        store: Arc<CredentialStore>,
    ) -> ClientResult<Self> {
        match descriptor.transport {
            TransportKind::Stdio => Ok(McpClient::Stdio(StdioClient::new(descriptor))),
            TransportKind::Http => Ok(McpClient::Http(HttpClient::new(descriptor, store)?)),
        }
    }

    pub fn package_id(&self) -> &str {
        match self {
            McpClient::Stdio(client) => client.package_id(),
            McpClient::Http(client) => client.package_id(),
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            McpClient::Stdio(_) => TransportKind::Stdio,
            McpClient::Http(_) => TransportKind::Http,
        }
    }

    pub async fn connect(&self) -> ClientResult<()> {
        match self {
            McpClient::Stdio(client) => client.connect().await,
            McpClient::Http(client) => client.connect().await,
        }
    }

    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDef>> {
        match self {
            McpClient::Stdio(client) => client.list_tools().await,
            McpClient::Http(client) => client.list_tools().await,
        }
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> ClientResult<Value> {
        match self {
            McpClient::Stdio(client) => client.call_tool(tool, arguments, timeout).await,
            McpClient::Http(client) => client.call_tool(tool, arguments, timeout).await,
        }
    }

    pub async fn read_resource(&self, uri: &str) -> ClientResult<Value> {
        match self {
            McpClient::Stdio(client) => client.read_resource(uri).await,
            McpClient::Http(client) => client.read_resource(uri).await,
        }
    }

    pub async fn close(&self) {
        match self {
            McpClient::Stdio(client) => client.close().await,
            McpClient::Http(client) => client.close().await,
        }
    }

    pub async fn health_check(&self) -> Health {
        match self {
            McpClient::Stdio(client) => match client.health().await {
                Ok(()) => Health::Ok,
                Err(e) => Health::Error(e.to_string()),
            },
            McpClient::Http(client) => match client.health().await {
                HttpHealth::Ok => Health::Ok,
                HttpHealth::NeedsAuth => Health::NeedsAuth,
                HttpHealth::Error(message) => Health::Error(message),
            },
        }
    }

    pub fn has_pending_requests(&self) -> bool {
        match self {
            McpClient::Stdio(client) => client.has_pending_requests(),
            McpClient::Http(client) => client.has_pending_requests(),
        }
    }

    /// Whether the SSE fallback fired (always false for stdio)
    pub fn used_sse_fallback(&self) -> bool {
        match self {
            McpClient::Stdio(_) => false,
            McpClient::Http(client) => client.used_sse_fallback(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        match self {
            McpClient::Stdio(_) => false,
            McpClient::Http(client) => client.requires_auth(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        match self {
            McpClient::Stdio(_) => true,
            McpClient::Http(client) => client.is_authenticated(),
        }
    }

    /// The HTTP-specific surface, when this is an HTTP client
    pub fn as_http(&self) -> Option<&HttpClient> {
        match self {
            McpClient::Stdio(_) => None,
            McpClient::Http(client) => Some(client),
        }
    }

    /// Classify an error for the registry's connect path: auth-shaped HTTP
    /// connect failures install the client unconnected instead of failing.
    pub fn connect_failure_is_auth(&self, error: &ClientError) -> bool {
        matches!(self, McpClient::Http(_)) && error.is_auth_shaped()
    }
}
