//! Opaque cursors and glob name patterns for tool listings

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;

use crate::error::{HandlerError, HandlerResult};

/// Default page size for `list_tools`
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard cap on the page size
pub const MAX_PAGE_SIZE: usize = 200;

/// Encode a list offset as an opaque cursor
pub fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("{{\"o\":{}}}", offset))
}

/// Decode a cursor produced by [`encode_cursor`]
pub fn decode_cursor(cursor: &str) -> HandlerResult<usize> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| HandlerError::InvalidParams("malformed cursor".to_string()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|_| HandlerError::InvalidParams("malformed cursor".to_string()))?;
    value
        .get("o")
        .and_then(|o| o.as_u64())
        .map(|o| o as usize)
        .ok_or_else(|| HandlerError::InvalidParams("malformed cursor".to_string()))
}

/// Translate a glob pattern into an anchored, case-insensitive regex:
/// consecutive `*` collapse, regex metacharacters are escaped, `*` becomes
/// `.*` and `?` becomes `.`.
pub fn compile_name_pattern(pattern: &str) -> HandlerResult<Regex> {
    let mut collapsed = String::with_capacity(pattern.len());
    let mut last_star = false;
    for c in pattern.chars() {
        if c == '*' {
            if !last_star {
                collapsed.push(c);
            }
            last_star = true;
        } else {
            collapsed.push(c);
            last_star = false;
        }
    }

    let mut source = String::with_capacity(collapsed.len() + 8);
    source.push_str("(?i)^");
    for c in collapsed.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source)
        .map_err(|e| HandlerError::InvalidParams(format!("invalid name_pattern: {}", e)))
}
