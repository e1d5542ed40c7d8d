//! Tool-argument validation
//!
//! Arguments are validated against the tool's JSON Schema. When the schema
//! sets `additionalProperties: false`, unknown top-level keys are stripped
//! before validation and their names reported back to the caller, so agents
//! hallucinating an extra argument degrade gracefully instead of failing.

use serde_json::Value;

use crate::error::{HandlerError, HandlerResult};

/// Outcome of validating (and possibly repairing) tool arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArgs {
    pub args: Value,
    /// Top-level keys removed because the schema forbids extras
    pub stripped: Vec<String>,
}

/// Validate `args` against `schema`, stripping unknown top-level
/// properties when the schema closes the object.
pub fn validate_args(schema: &Value, args: &Value) -> HandlerResult<ValidatedArgs> {
    let mut args = args.clone();
    let mut stripped = Vec::new();

    let closed = schema
        .get("additionalProperties")
        .and_then(|v| v.as_bool())
        .map(|allowed| !allowed)
        .unwrap_or(false);

    if closed {
        if let (Some(object), Some(properties)) = (
            args.as_object_mut(),
            schema.get("properties").and_then(|p| p.as_object()),
        ) {
            let unknown: Vec<String> = object
                .keys()
                .filter(|k| !properties.contains_key(*k))
                .cloned()
                .collect();
            for key in &unknown {
                object.remove(key);
            }
            stripped = unknown;
        }
    }

    let validator = jsonschema::validator_for(schema).map_err(|e| {
        HandlerError::Internal(format!("tool schema does not compile: {}", e))
    })?;

    let failures: Vec<String> = validator
        .iter_errors(&args)
        .map(|error| {
            let path = error.instance_path.to_string();
            if path.is_empty() {
                error.to_string()
            } else {
                format!("{}: {}", path, error)
            }
        })
        .collect();

    if !failures.is_empty() {
        return Err(HandlerError::ArgValidationFailed {
            message: failures.join("; "),
        });
    }

    Ok(ValidatedArgs { args, stripped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn closed_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "limit": {"type": "number"}
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_strips_exactly_the_unknown_keys() {
        let args = json!({"path": "/tmp/x", "limit": 3, "verbose": true, "color": "red"});
        let validated = validate_args(&closed_schema(), &args).unwrap();

        let mut stripped = validated.stripped.clone();
        stripped.sort();
        assert_eq!(stripped, vec!["color", "verbose"]);
        assert_eq!(validated.args, json!({"path": "/tmp/x", "limit": 3}));
    }

    #[test]
    fn test_matching_keys_are_untouched() {
        let args = json!({"path": "/tmp/x", "limit": 3});
        let validated = validate_args(&closed_schema(), &args).unwrap();
        assert!(validated.stripped.is_empty());
        assert_eq!(validated.args, args);
    }

    #[test]
    fn test_open_schema_keeps_extras() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}}
        });
        let args = json!({"path": "x", "extra": 1});
        let validated = validate_args(&schema, &args).unwrap();
        assert!(validated.stripped.is_empty());
        assert_eq!(validated.args, args);
    }

    #[test]
    fn test_missing_required_fails_validation() {
        let err = validate_args(&closed_schema(), &json!({"limit": 3})).unwrap_err();
        assert_eq!(err.code(), -32003);
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_wrong_type_fails_validation() {
        let err = validate_args(&closed_schema(), &json!({"path": 42})).unwrap_err();
        assert_eq!(err.code(), -32003);
    }
}
