//! JSON-RPC 2.0 framing and the MCP methods the router speaks upstream

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 version string
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision sent in the initialize handshake
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PING: &str = "ping";
    pub const PROGRESS: &str = "notifications/progress";
}

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name to call
    pub method: String,

    /// Method parameters (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Request ID for correlation (absent for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Create a new JSON-RPC request with string ID
    pub fn with_id(method: impl Into<String>, params: Option<Value>, id: impl Into<String>) -> Self {
        Self::new(method, params, Some(Value::String(id.into())))
    }

    /// Create a notification (no ID, no response expected)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(method, params, None)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    pub id: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The response ID as a string, for correlation
    pub fn id_as_string(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(value) => Some(value.to_string()),
            None => None,
        }
    }
}

/// JSON-RPC 2.0 error information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-initiated notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Anything an upstream server may send on its outbound channel.
///
/// Order matters for the untagged deserializer: notifications carry a
/// `method` field responses never have.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl ServerMessage {
    /// Parse one line or SSE data payload
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The progress token when this is a progress notification
    pub fn progress_token(&self) -> Option<String> {
        match self {
            ServerMessage::Notification(notification)
                if notification.method == methods::PROGRESS =>
            {
                notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("progressToken"))
                    .map(value_to_token)
            }
            _ => None,
        }
    }
}

fn value_to_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One tool as advertised by an upstream server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,

    /// Optional metadata blob; UI-capable servers advertise resource URIs
    /// here (e.g. `ui://viewer/app.html`).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// `tools/list` result page
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsPage {
    #[serde(default)]
    pub tools: Vec<ToolDef>,

    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// Parameters for the initialize handshake
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "super-mcp",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Parameters for a `tools/call`, threading the request id through as the
/// progress token so progress notifications can reset the call deadline.
pub fn call_tool_params(tool: &str, arguments: &Value, progress_token: &str) -> Value {
    serde_json::json!({
        "name": tool,
        "arguments": arguments,
        "_meta": { "progressToken": progress_token },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_round_trip() {
        let request = JsonRpcRequest::with_id("tools/list", Some(json!({"cursor": null})), "42");
        let serialized = serde_json::to_string(&request).unwrap();
        let deserialized: JsonRpcRequest = serde_json::from_str(&serialized).unwrap();
        assert_eq!(request, deserialized);
        assert!(!request.is_notification());
    }

    #[test]
    fn test_server_message_classification() {
        let response = ServerMessage::parse(r#"{"jsonrpc":"2.0","result":{"ok":true},"id":"1"}"#).unwrap();
        assert!(matches!(response, ServerMessage::Response(_)));

        let notification =
            ServerMessage::parse(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"progressToken":"1","progress":3}}"#)
                .unwrap();
        assert!(matches!(notification, ServerMessage::Notification(_)));
        assert_eq!(notification.progress_token().as_deref(), Some("1"));
    }

    #[test]
    fn test_numeric_progress_token() {
        let message =
            ServerMessage::parse(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"progressToken":7}}"#)
                .unwrap();
        assert_eq!(message.progress_token().as_deref(), Some("7"));
    }

    #[test]
    fn test_tool_def_parses_input_schema() {
        let tool: ToolDef = serde_json::from_value(json!({
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        }))
        .unwrap();
        assert_eq!(tool.name, "read_file");
        assert!(tool.input_schema.get("properties").is_some());
    }

    #[test]
    fn test_error_response() {
        let response =
            ServerMessage::parse(r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"9"}"#)
                .unwrap();
        let ServerMessage::Response(response) = response else {
            panic!("expected response");
        };
        assert!(response.is_error());
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
