//! Environment variable expansion and placeholder detection
//!
//! Expansion runs over every string value in a raw entry. `${VAR}` is the
//! documented form and warns when the variable is unset; bare `$VAR` expands
//! silently and is left untouched when unset.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACED_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced var regex"));
static BARE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("bare var regex"));
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"YOUR_[A-Z0-9_]*").expect("placeholder regex"));

/// Expand environment variables in a single string value
pub fn expand_str(value: &str) -> String {
    let pass1 = BRACED_VAR.replace_all(value, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, "environment variable referenced in config is unset");
                String::new()
            }
        }
    });

    BARE_VAR
        .replace_all(&pass1, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(v) => v,
                // Silent form: leave the reference as written.
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expand environment variables in every string value of a JSON tree
pub fn expand_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(expand_str(s)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(expand_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), expand_value(v))).collect(),
        ),
        other => other.clone(),
    }
}

/// Collect dotted paths of fields whose values carry `YOUR_*` markers
pub fn find_placeholders(value: &serde_json::Value) -> Vec<String> {
    let mut found = Vec::new();
    walk_placeholders(value, String::new(), &mut found);
    found
}

fn walk_placeholders(value: &serde_json::Value, path: String, found: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            if PLACEHOLDER.is_match(s) {
                found.push(if path.is_empty() { "<value>".to_string() } else { path });
            }
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let child = if path.is_empty() {
                    format!("[{}]", i)
                } else {
                    format!("{}[{}]", path, i)
                };
                walk_placeholders(item, child, found);
            }
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let child = if path.is_empty() { k.clone() } else { format!("{}.{}", path, k) };
                walk_placeholders(v, child, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_braced_expansion() {
        std::env::set_var("SMCP_TEST_TOKEN", "sekrit");
        assert_eq!(expand_str("Bearer ${SMCP_TEST_TOKEN}"), "Bearer sekrit");
        std::env::remove_var("SMCP_TEST_TOKEN");
    }

    #[test]
    fn test_unset_braced_expands_to_empty() {
        std::env::remove_var("SMCP_TEST_MISSING");
        assert_eq!(expand_str("x${SMCP_TEST_MISSING}y"), "xy");
    }

    #[test]
    fn test_unset_bare_is_left_alone() {
        std::env::remove_var("SMCP_TEST_MISSING");
        assert_eq!(expand_str("$SMCP_TEST_MISSING"), "$SMCP_TEST_MISSING");
    }

    #[test]
    fn test_bare_expansion_when_set() {
        std::env::set_var("SMCP_TEST_HOME", "/tmp/home");
        assert_eq!(expand_str("$SMCP_TEST_HOME/bin"), "/tmp/home/bin");
        std::env::remove_var("SMCP_TEST_HOME");
    }

    #[test]
    fn test_placeholder_detection_paths() {
        let entry = json!({
            "url": "https://api.example.com",
            "headers": {"Authorization": "Bearer YOUR_API_KEY"},
            "args": ["--token", "YOUR_TOKEN"]
        });

        let mut found = find_placeholders(&entry);
        found.sort();
        assert_eq!(found, vec!["args[1]", "headers.Authorization"]);
    }
}
