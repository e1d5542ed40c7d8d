//! The MCP service surface exposed to agents
//!
//! Translates inbound JSON-RPC requests (from either front end) into
//! router calls. The router's tools are advertised through the standard
//! `tools/list` / `tools/call` pair.

use serde_json::{json, Value};
use std::sync::Arc;

use supermcp_client::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

use crate::error::HandlerError;
use crate::router::Router;

/// Server identity reported in the initialize handshake
const SERVER_NAME: &str = "super-mcp";

pub struct McpService {
    router: Arc<Router>,
}

impl McpService {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Handle one inbound message. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification from client");
            return None;
        }

        let result = match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": supermcp_client::MCP_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(request.params).await,
            other => {
                return Some(JsonRpcResponse::error(
                    JsonRpcError {
                        code: -32601,
                        message: format!("Method '{}' not found", other),
                        data: None,
                    },
                    id,
                ));
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(value, id),
            Err(e) => JsonRpcResponse::error(
                JsonRpcError {
                    code: e.code(),
                    message: e.to_string(),
                    data: None,
                },
                id,
            ),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        let params = params.ok_or_else(|| {
            HandlerError::InvalidParams("tools/call requires params".to_string())
        })?;
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| HandlerError::InvalidParams("missing tool name".to_string()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match self.router.dispatch(&name, arguments).await {
            Ok(result) => Ok(json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|_| result.to_string()),
                }],
                "isError": false,
            })),
            Err(e) => Err(e),
        }
    }
}

/// Definitions of the router's own tools, as advertised to the agent
pub fn tool_definitions() -> Vec<Value> {
    let package_id_only = json!({
        "type": "object",
        "properties": {
            "package_id": {"type": "string", "description": "Package id"}
        },
        "required": ["package_id"],
        "additionalProperties": false
    });

    vec![
        json!({
            "name": "list_tool_packages",
            "description": "List the configured packages with their tool-list status.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "include_health": {"type": "boolean", "description": "Also run a health check per package"}
                },
                "additionalProperties": false
            }
        }),
        json!({
            "name": "list_tools",
            "description": "List tools, optionally filtered by package or a glob name pattern, paginated by cursor.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "package_id": {"type": "string"},
                    "name_pattern": {"type": "string", "description": "Glob; * and ? wildcards"},
                    "cursor": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "additionalProperties": false
            }
        }),
        json!({
            "name": "use_tool",
            "description": "Call a tool. tool_id may be namespaced ({package}__{tool}) or used with package_id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "package_id": {"type": "string"},
                    "tool_id": {"type": "string"},
                    "args": {"type": "object"},
                    "dry_run": {"type": "boolean"},
                    "max_output_chars": {"type": "integer", "minimum": 1}
                },
                "required": ["tool_id"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_help",
            "description": "Usage help. Topics: overview, tools, authentication, troubleshooting.",
            "inputSchema": {
                "type": "object",
                "properties": {"topic": {"type": "string"}},
                "additionalProperties": false
            }
        }),
        json!({
            "name": "health_check",
            "description": "Check one package's health.",
            "inputSchema": package_id_only.clone()
        }),
        json!({
            "name": "health_check_all",
            "description": "Check every package's health.",
            "inputSchema": {"type": "object", "properties": {}, "additionalProperties": false}
        }),
        json!({
            "name": "authenticate",
            "description": "Run the browser OAuth flow for a package.",
            "inputSchema": package_id_only.clone()
        }),
        json!({
            "name": "restart_package",
            "description": "Close and re-create a package from its current configuration.",
            "inputSchema": package_id_only
        }),
        json!({
            "name": "search_tools",
            "description": "Rank tools against a free-text query.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["query"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "read_resource",
            "description": "Read a resource URI advertised by a package's tools.",
            "inputSchema": {
                "type": "object",
                "properties": {"uri": {"type": "string"}},
                "required": ["uri"],
                "additionalProperties": false
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_published_tool_is_defined() {
        let names: Vec<String> = tool_definitions()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        for expected in [
            "list_tool_packages",
            "list_tools",
            "use_tool",
            "get_help",
            "health_check",
            "health_check_all",
            "authenticate",
            "restart_package",
            "search_tools",
            "read_resource",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_tool_schemas_compile() {
        for tool in tool_definitions() {
            assert!(
                jsonschema::validator_for(&tool["inputSchema"]).is_ok(),
                "schema for {} does not compile",
                tool["name"]
            );
        }
    }
}
