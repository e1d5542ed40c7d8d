//! MCP stdio front end
//!
//! Line-delimited JSON-RPC on stdin/stdout. Stdout carries protocol
//! traffic only; all logging goes to stderr.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use supermcp_client::JsonRpcRequest;

use crate::service::McpService;

/// Serve until stdin closes.
pub async fn serve(service: McpService) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!("serving MCP over stdio");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                continue;
            }
        };

        if let Some(response) = service.handle(request).await {
            let rendered = serde_json::to_string(&response)?;
            stdout.write_all(rendered.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed; shutting down");
    Ok(())
}
