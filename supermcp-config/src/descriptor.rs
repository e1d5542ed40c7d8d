//! Package descriptors and per-entry normalization
//!
//! A descriptor is the immutable, validated form of one `mcpServers` entry.
//! Normalization happens against the raw JSON entry so that a restart can
//! re-run it and pick up environment variable changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::expand::{expand_value, find_placeholders};

/// Transport selector for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking line-delimited JSON-RPC over pipes
    Stdio,
    /// Remote endpoint speaking streamable HTTP (or HTTP+SSE)
    Http,
}

/// HTTP transport flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpSubtype {
    /// Current-generation streamable HTTP transport
    Streamable,
    /// Older HTTP+SSE transport with separate POST and event channels
    Sse,
}

/// Whether the package is shown in listings by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Default,
    Hidden,
}

/// Immutable, validated description of one upstream MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Unique package id
    pub id: String,

    /// Human-readable name (defaults to the id)
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Transport used to reach the server
    pub transport: TransportKind,

    /// Command to execute (stdio only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Command arguments (stdio only)
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process (stdio only)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the child process (stdio only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Endpoint URL (http only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// HTTP transport flavor (http only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_subtype: Option<HttpSubtype>,

    /// Additional headers sent on every HTTP request
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,

    /// Whether the package requires OAuth authorization
    #[serde(default)]
    pub oauth: bool,

    /// Statically configured OAuth client id (skips dynamic registration)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,

    /// Statically configured OAuth client secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_client_secret: Option<String>,

    /// Per-package tool call timeout override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Listing visibility
    pub visibility: Visibility,
}

impl PackageDescriptor {
    /// Whether listings should include this package
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Default
    }
}

/// A config entry that failed validation and is excluded from routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPackage {
    pub id: String,
    pub reason: String,
}

/// Result of normalizing one raw entry
#[derive(Debug, Clone)]
pub struct NormalizedPackage {
    pub descriptor: PackageDescriptor,
    /// Fields whose values still carry `YOUR_*` placeholder markers
    pub placeholder_fields: Vec<String>,
}

fn opt_string(entry: &serde_json::Value, key: &str) -> Option<String> {
    entry.get(key).and_then(|v| v.as_str()).map(str::to_owned)
}

fn string_array(entry: &serde_json::Value, key: &str) -> Vec<String> {
    entry
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

fn string_map(entry: &serde_json::Value, key: &str) -> HashMap<String, String> {
    entry
        .get(key)
        .and_then(|v| v.as_object())
        .map(|o| {
            o.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Normalize and validate one raw `mcpServers` entry.
///
/// Environment variable expansion runs first so restarts observe current
/// values. Returns the skip reason on validation failure.
pub fn normalize_entry(id: &str, raw: &serde_json::Value) -> Result<NormalizedPackage, String> {
    if !valid_id(id) {
        return Err(format!(
            "id must be a non-empty string of letters, digits, '-', '_' or '.', got {:?}",
            id
        ));
    }

    let entry = expand_value(raw);

    let type_field = opt_string(&entry, "type");
    let command = opt_string(&entry, "command");
    let url = opt_string(&entry, "url");

    let (transport, http_subtype) = match type_field.as_deref() {
        Some("stdio") => (TransportKind::Stdio, None),
        Some("sse") => (TransportKind::Http, Some(HttpSubtype::Sse)),
        Some("http") => (TransportKind::Http, Some(HttpSubtype::Streamable)),
        Some(other) => {
            return Err(format!(
                "type must be one of \"stdio\", \"sse\" or \"http\", got {:?}",
                other
            ))
        }
        None if url.is_some() => (TransportKind::Http, Some(HttpSubtype::Streamable)),
        None if command.is_some() => (TransportKind::Stdio, None),
        None => return Err("entry must specify either \"command\" or \"url\"".to_string()),
    };

    match transport {
        TransportKind::Stdio => {
            if command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err("command must be a non-empty string for stdio packages".to_string());
            }
        }
        TransportKind::Http => {
            let candidate = url.as_deref().unwrap_or("");
            match url::Url::parse(candidate) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(format!("base_url must be a valid URL, got {:?}", candidate));
                }
            }
        }
    }

    let visibility = match opt_string(&entry, "visibility").as_deref() {
        None | Some("default") => Visibility::Default,
        Some("hidden") => Visibility::Hidden,
        Some(other) => {
            return Err(format!(
                "visibility must be \"default\" or \"hidden\", got {:?}",
                other
            ))
        }
    };

    let placeholder_fields = find_placeholders(&entry);
    if !placeholder_fields.is_empty() {
        tracing::warn!(
            package = id,
            fields = ?placeholder_fields,
            "config values contain placeholder markers; replace them with real credentials"
        );
    }

    let descriptor = PackageDescriptor {
        id: id.to_string(),
        name: opt_string(&entry, "name").unwrap_or_else(|| id.to_string()),
        description: opt_string(&entry, "description"),
        transport,
        command,
        args: string_array(&entry, "args"),
        env: string_map(&entry, "env"),
        cwd: opt_string(&entry, "cwd"),
        base_url: url,
        http_subtype,
        extra_headers: string_map(&entry, "headers"),
        oauth: entry.get("oauth").and_then(|v| v.as_bool()).unwrap_or(false),
        oauth_client_id: opt_string(&entry, "oauthClientId"),
        oauth_client_secret: opt_string(&entry, "oauthClientSecret"),
        timeout_ms: entry.get("timeout").and_then(|v| v.as_u64()),
        visibility,
    };

    Ok(NormalizedPackage {
        descriptor,
        placeholder_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stdio_entry_normalization() {
        let raw = json!({"command": "npx", "args": ["-y", "fs-server"], "env": {"DEBUG": "1"}});
        let normalized = normalize_entry("fs", &raw).unwrap();

        assert_eq!(normalized.descriptor.transport, TransportKind::Stdio);
        assert_eq!(normalized.descriptor.command.as_deref(), Some("npx"));
        assert_eq!(normalized.descriptor.args, vec!["-y", "fs-server"]);
        assert_eq!(normalized.descriptor.name, "fs");
        assert_eq!(normalized.descriptor.visibility, Visibility::Default);
    }

    #[test]
    fn test_http_entry_with_sse_type() {
        let raw = json!({"type": "sse", "url": "https://example.com/mcp"});
        let normalized = normalize_entry("remote", &raw).unwrap();

        assert_eq!(normalized.descriptor.transport, TransportKind::Http);
        assert_eq!(normalized.descriptor.http_subtype, Some(HttpSubtype::Sse));
    }

    #[test]
    fn test_invalid_url_reason_shape() {
        let raw = json!({"type": "http", "url": "not a url"});
        let reason = normalize_entry("x", &raw).unwrap_err();
        assert_eq!(reason, "base_url must be a valid URL, got \"not a url\"");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let raw = json!({"command": "  "});
        let reason = normalize_entry("p", &raw).unwrap_err();
        assert!(reason.contains("command must be a non-empty string"));
    }

    #[test]
    fn test_illegal_visibility_is_rejected() {
        let raw = json!({"command": "echo", "visibility": "internal"});
        let reason = normalize_entry("p", &raw).unwrap_err();
        assert!(reason.contains("visibility"));
        assert!(reason.contains("internal"));
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let raw = json!({"command": "echo"});
        assert!(normalize_entry("", &raw).is_err());
        assert!(normalize_entry("bad id", &raw).is_err());
        assert!(normalize_entry("ok-id_2.x", &raw).is_ok());
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        let raw = json!({"url": "ftp://example.com/mcp"});
        assert!(normalize_entry("p", &raw).is_err());
    }
}
