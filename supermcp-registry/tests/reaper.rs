//! Idle reaper behavior against a real stdio package

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use supermcp_auth::CredentialStore;
use supermcp_config::ConfigLoader;
use supermcp_registry::PackageRegistry;

const SERVER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","result":{"protocolVersion":"2025-03-26","capabilities":{}},"id":"%s"}\n' "$id"
      ;;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","result":{"tools":[]},"id":"%s"}\n' "$id"
      ;;
    *'"tools/call"'*)
      sleep 0.5
      printf '{"jsonrpc":"2.0","result":{"ok":true},"id":"%s"}\n' "$id"
      ;;
  esac
done
"#;

async fn registry_with_echo(dir: &tempfile::TempDir) -> Arc<PackageRegistry> {
    let script = dir.path().join("server.sh");
    std::fs::write(&script, SERVER_SCRIPT).unwrap();

    let config_path: PathBuf = dir.path().join("config.json");
    let config_json = serde_json::json!({
        "mcpServers": {
            "echo": {"command": "sh", "args": [script.to_string_lossy()]}
        }
    });
    std::fs::write(&config_path, config_json.to_string()).unwrap();

    let config = ConfigLoader::new().load(&[config_path]).unwrap();
    let store = Arc::new(CredentialStore::with_root(dir.path().join("tokens")));
    Arc::new(PackageRegistry::new(config, store))
}

#[tokio::test]
async fn test_idle_stdio_client_is_reaped_and_recreated() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with_echo(&dir).await;

    let first = registry.get_client("echo").await.unwrap();
    assert!(registry.has_client("echo").await);

    // Idle for longer than the default 300 s threshold.
    registry.set_last_activity("echo", Duration::from_secs(301)).await;
    registry.sweep_idle().await;
    assert!(!registry.has_client("echo").await);

    // The next get_client reconnects with a fresh instance.
    let second = registry.get_client("echo").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    registry.close_all().await;
}

#[tokio::test]
async fn test_fresh_client_is_not_reaped() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with_echo(&dir).await;

    registry.get_client("echo").await.unwrap();
    registry.sweep_idle().await;
    assert!(registry.has_client("echo").await);

    registry.close_all().await;
}

#[tokio::test]
async fn test_busy_client_is_never_reaped() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = registry_with_echo(&dir).await;

    let client = registry.get_client("echo").await.unwrap();

    // A tool call that takes ~500 ms upstream.
    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_tool("anything", &serde_json::json!({}), Duration::from_secs(5))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.has_pending_requests());

    // Backdated but busy: the sweep must leave it alone.
    registry.set_last_activity("echo", Duration::from_secs(301)).await;
    registry.sweep_idle().await;
    assert!(registry.has_client("echo").await);

    call.await.unwrap().unwrap();
    registry.close_all().await;
}

