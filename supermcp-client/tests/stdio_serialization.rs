//! End-to-end stdio client tests against a scripted MCP server
//!
//! The fixture is a small shell loop that answers initialize, tools/list
//! and tools/call with a fixed 100 ms handling delay, recording a
//! timestamp for every request it reads. Serialization of the stdio queue
//! shows up as adjacent request timestamps at least the handling delay
//! apart.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use supermcp_client::{McpClient, StdioClient};
use supermcp_config::{PackageDescriptor, TransportKind, Visibility};

const SERVER_SCRIPT: &str = r#"
timestamps="$1"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","result":{"protocolVersion":"2025-03-26","capabilities":{}},"id":"%s"}\n' "$id"
      ;;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","result":{"tools":[{"name":"echo","description":"Echo back","inputSchema":{"type":"object"}}]},"id":"%s"}\n' "$id"
      ;;
    *'"tools/call"'*)
      date +%s%N >> "$timestamps"
      sleep 0.1
      printf '{"jsonrpc":"2.0","result":{"ok":true},"id":"%s"}\n' "$id"
      ;;
  esac
done
"#;

fn fixture(dir: &tempfile::TempDir) -> (PackageDescriptor, std::path::PathBuf) {
    let script = dir.path().join("server.sh");
    std::fs::write(&script, SERVER_SCRIPT).unwrap();
    let timestamps = dir.path().join("timestamps.log");

    let descriptor = PackageDescriptor {
        id: "echo".to_string(),
        name: "echo".to_string(),
        description: None,
        transport: TransportKind::Stdio,
        command: Some("sh".to_string()),
        args: vec![
            script.to_string_lossy().into_owned(),
            timestamps.to_string_lossy().into_owned(),
        ],
        env: HashMap::new(),
        cwd: None,
        base_url: None,
        http_subtype: None,
        extra_headers: HashMap::new(),
        oauth: false,
        oauth_client_id: None,
        oauth_client_secret: None,
        timeout_ms: None,
        visibility: Visibility::Default,
    };
    (descriptor, timestamps)
}

#[tokio::test]
async fn test_connect_and_list_tools() {
    let dir = tempfile::TempDir::new().unwrap();
    let (descriptor, _timestamps) = fixture(&dir);

    let client = StdioClient::new(descriptor);
    client.connect().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    client.close().await;
}

#[tokio::test]
async fn test_concurrent_calls_are_serialized() {
    let dir = tempfile::TempDir::new().unwrap();
    let (descriptor, timestamps) = fixture(&dir);

    let client = Arc::new(StdioClient::new(descriptor));
    client.connect().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .call_tool("echo", &serde_json::json!({}), Duration::from_secs(10))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    client.close().await;

    let recorded: Vec<u128> = std::fs::read_to_string(&timestamps)
        .unwrap()
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    assert_eq!(recorded.len(), 10);

    // The server records each request on arrival and then sleeps 100 ms
    // before answering; with a serial pipe, adjacent arrivals are at least
    // that far apart (small epsilon for clock granularity).
    for window in recorded.windows(2) {
        let gap_ns = window[1].saturating_sub(window[0]);
        assert!(
            gap_ns >= 95_000_000,
            "requests overlapped: gap was {} ns",
            gap_ns
        );
    }
}

#[tokio::test]
async fn test_call_after_close_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let (descriptor, _timestamps) = fixture(&dir);

    let client = McpClient::Stdio(StdioClient::new(descriptor));
    client.connect().await.unwrap();
    client.close().await;

    let err = client
        .call_tool("echo", &serde_json::json!({}), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, supermcp_client::ClientError::Closed));
}

#[tokio::test]
async fn test_health_reflects_child_exit() {
    let dir = tempfile::TempDir::new().unwrap();
    let (descriptor, _timestamps) = fixture(&dir);

    let client = StdioClient::new(descriptor);
    client.connect().await.unwrap();
    assert!(client.health().await.is_ok());

    client.close().await;
}
