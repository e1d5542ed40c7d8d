//! Environment-tunable timeouts

use std::time::Duration;

fn env_ms(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Overall connect timeout: handshake plus any OAuth refresh.
/// `SUPER_MCP_CONNECT_TIMEOUT_MS`, default 30 s.
pub fn connect_timeout() -> Duration {
    Duration::from_millis(env_ms("SUPER_MCP_CONNECT_TIMEOUT_MS").unwrap_or(30_000))
}

/// `tools/list` timeout. `SUPER_MCP_LIST_TOOLS_TIMEOUT` (or `_MS`),
/// default 10 s; 30 s on Windows where AV cold-starts inflate spawn time.
pub fn list_tools_timeout() -> Duration {
    let default = if cfg!(windows) { 30_000 } else { 10_000 };
    let ms = env_ms("SUPER_MCP_LIST_TOOLS_TIMEOUT_MS")
        .or_else(|| env_ms("SUPER_MCP_LIST_TOOLS_TIMEOUT"))
        .unwrap_or(default);
    Duration::from_millis(ms)
}

/// Default tool call timeout. `SUPER_MCP_TOOL_TIMEOUT` (ms), default 300 s.
pub fn tool_call_timeout() -> Duration {
    Duration::from_millis(env_ms("SUPER_MCP_TOOL_TIMEOUT").unwrap_or(300_000))
}

/// Idle threshold for the stdio reaper. `SUPER_MCP_IDLE_TIMEOUT_MS`,
/// default 300 s; `0` disables reaping.
pub fn idle_timeout() -> Option<Duration> {
    match env_ms("SUPER_MCP_IDLE_TIMEOUT_MS").unwrap_or(300_000) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        std::env::remove_var("SUPER_MCP_CONNECT_TIMEOUT_MS");
        std::env::remove_var("SUPER_MCP_TOOL_TIMEOUT");
        assert_eq!(connect_timeout(), Duration::from_secs(30));
        assert_eq!(tool_call_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_idle_zero_disables() {
        std::env::set_var("SUPER_MCP_IDLE_TIMEOUT_MS", "0");
        assert_eq!(idle_timeout(), None);
        std::env::set_var("SUPER_MCP_IDLE_TIMEOUT_MS", "1500");
        assert_eq!(idle_timeout(), Some(Duration::from_millis(1500)));
        std::env::remove_var("SUPER_MCP_IDLE_TIMEOUT_MS");
    }
}
