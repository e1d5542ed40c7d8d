//! Pattern compilation for the security policy
//!
//! Two grammars are accepted: a literal (matched exactly, anchored, with
//! regex metacharacters escaped) and a delimited regex of the form
//! `/body/flags`. Patterns that fail the safety checks are rejected at
//! compile time and match nothing.

use regex::Regex;

/// Raw patterns longer than this are rejected outright
pub const MAX_PATTERN_LEN: usize = 500;

/// Match inputs are truncated to this many characters. Tool and package
/// names are naturally short; longer inputs indicate abuse.
pub const MAX_INPUT_LEN: usize = 100;

/// One compiled allow/block pattern
#[derive(Debug)]
pub struct CompiledPattern {
    raw: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compile a raw pattern, or reject it with a warning.
    pub fn compile(raw: &str) -> Option<Self> {
        if raw.len() > MAX_PATTERN_LEN {
            tracing::warn!(
                pattern_len = raw.len(),
                "rejecting security pattern longer than {} chars",
                MAX_PATTERN_LEN
            );
            return None;
        }

        let source = match parse_delimited(raw) {
            Some((body, flags)) => {
                if has_nested_quantifier(body) {
                    tracing::warn!(pattern = raw, "rejecting security regex with nested quantifiers");
                    return None;
                }
                let mut inline = String::new();
                for flag in flags.chars() {
                    match flag {
                        'i' => inline.push('i'),
                        'm' => inline.push('m'),
                        's' => inline.push('s'),
                        // Stateful or JS-only flags carry no meaning here;
                        // matching is cursor-free by construction.
                        'g' | 'y' | 'u' => {}
                        other => {
                            tracing::warn!(pattern = raw, flag = %other, "rejecting security regex with unsupported flag");
                            return None;
                        }
                    }
                }
                if inline.is_empty() {
                    body.to_string()
                } else {
                    format!("(?{}){}", inline, body)
                }
            }
            None => format!("^{}$", regex::escape(raw)),
        };

        match Regex::new(&source) {
            Ok(regex) => Some(Self {
                raw: raw.to_string(),
                regex,
            }),
            Err(e) => {
                tracing::warn!(pattern = raw, error = %e, "rejecting invalid security regex");
                None
            }
        }
    }

    /// Test an input against the pattern, truncating oversized inputs.
    pub fn matches(&self, input: &str) -> bool {
        let truncated: &str = if input.chars().count() > MAX_INPUT_LEN {
            let end = input
                .char_indices()
                .nth(MAX_INPUT_LEN)
                .map(|(i, _)| i)
                .unwrap_or(input.len());
            &input[..end]
        } else {
            input
        };
        self.regex.is_match(truncated)
    }

    /// The pattern as written in the config
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Split `/body/flags` into its parts; anything else is a literal.
fn parse_delimited(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    if end == 0 {
        return None;
    }
    let (body, flags) = rest.split_at(end);
    Some((body, &flags[1..]))
}

/// Heuristic for catastrophic-backtracking shapes: a quantifier applied to
/// a group whose body itself contains an unescaped quantifier.
fn has_nested_quantifier(body: &str) -> bool {
    let chars: Vec<char> = body.chars().collect();
    let mut group_has_quantifier = vec![false];
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '(' => group_has_quantifier.push(false),
            ')' => {
                let inner = group_has_quantifier.pop().unwrap_or(false);
                let quantified = matches!(chars.get(i + 1), Some('+' | '*' | '{'));
                if inner && quantified {
                    return true;
                }
                if let Some(top) = group_has_quantifier.last_mut() {
                    *top |= inner;
                }
            }
            '+' | '*' | '{' => {
                if let Some(top) = group_has_quantifier.last_mut() {
                    *top = true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_anchored_and_escaped() {
        let pattern = CompiledPattern::compile("fs__read.file").unwrap();
        assert!(pattern.matches("fs__read.file"));
        assert!(!pattern.matches("fs__readXfile"));
        assert!(!pattern.matches("prefix fs__read.file"));
    }

    #[test]
    fn test_delimited_regex_with_flags() {
        let pattern = CompiledPattern::compile("/^dangerous_/i").unwrap();
        assert!(pattern.matches("Dangerous_tool"));
        assert!(!pattern.matches("safe_tool"));
    }

    #[test]
    fn test_stateful_flags_are_tolerated() {
        let pattern = CompiledPattern::compile("/^exec/g").unwrap();
        // Repeated matching must not depend on any cursor state.
        assert!(pattern.matches("exec_shell"));
        assert!(pattern.matches("exec_shell"));
    }

    #[test]
    fn test_overlong_pattern_is_rejected() {
        let raw = format!("/{}/", "a".repeat(600));
        assert!(CompiledPattern::compile(&raw).is_none());
    }

    #[test]
    fn test_nested_quantifier_is_rejected() {
        assert!(CompiledPattern::compile("/(a+)+$/").is_none());
        assert!(CompiledPattern::compile("/(ab*)*/").is_none());
        assert!(CompiledPattern::compile("/(abc)+def/").is_some());
    }

    #[test]
    fn test_input_truncation() {
        let pattern = CompiledPattern::compile("/z$/").unwrap();
        let long = format!("{}z", "a".repeat(200));
        // The z sits beyond the truncation point and must not match.
        assert!(!pattern.matches(&long));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        assert!(CompiledPattern::compile("/(unclosed/").is_none());
    }
}
