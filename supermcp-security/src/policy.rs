//! Layered security policy
//!
//! A subject passes iff (no allowlist is configured OR it matches the
//! allowlist) AND it does not match the blocklist. The user-disabled set is
//! a second-level filter applied on top; a security block always wins the
//! displayed reason.

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

use supermcp_config::SecurityConfig;

use crate::patterns::CompiledPattern;

/// Outcome of a block check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDecision {
    pub blocked: bool,
    pub reason: Option<String>,
}

impl BlockDecision {
    fn allowed() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

/// Display annotation for one tool in listings and search results
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ToolAnnotation {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub user_disabled: bool,
}

/// Compiled security policy, swapped atomically on config reload
#[derive(Debug, Default)]
pub struct SecurityPolicy {
    blocked_tools: Vec<CompiledPattern>,
    blocked_packages: Vec<CompiledPattern>,
    allowed_tools: Vec<CompiledPattern>,
    allowed_packages: Vec<CompiledPattern>,
    log_blocked_attempts: bool,
    user_disabled: HashMap<String, BTreeSet<String>>,
}

fn compile_all(raw: &[String]) -> Vec<CompiledPattern> {
    raw.iter().filter_map(|p| CompiledPattern::compile(p)).collect()
}

impl SecurityPolicy {
    /// Compile a policy from the merged security config and the
    /// user-disabled overlay.
    pub fn compile(
        config: &SecurityConfig,
        user_disabled: HashMap<String, BTreeSet<String>>,
    ) -> Self {
        Self {
            blocked_tools: compile_all(&config.blocked_tools),
            blocked_packages: compile_all(&config.blocked_packages),
            allowed_tools: compile_all(&config.allowed_tools),
            allowed_packages: compile_all(&config.allowed_packages),
            log_blocked_attempts: config.log_blocked_attempts.unwrap_or(false),
            user_disabled,
        }
    }

    /// Layered gate for a package id
    pub fn is_package_blocked(&self, package_id: &str) -> BlockDecision {
        if !self.allowed_packages.is_empty()
            && !self.allowed_packages.iter().any(|p| p.matches(package_id))
        {
            return self.log_decision(
                package_id,
                BlockDecision::blocked(format!("Package {:?} is not in allowedPackages", package_id)),
            );
        }
        if let Some(pattern) = self.blocked_packages.iter().find(|p| p.matches(package_id)) {
            return self.log_decision(
                package_id,
                BlockDecision::blocked(format!(
                    "Package {:?} matches blockedPackages pattern {:?}",
                    package_id,
                    pattern.raw()
                )),
            );
        }
        BlockDecision::allowed()
    }

    /// Layered gate for a tool. Both the namespaced `{pkg}__{tool}` form
    /// and the bare tool name are tested.
    pub fn is_tool_blocked(&self, package_id: &str, tool_name: &str) -> BlockDecision {
        let namespaced = format!("{}__{}", package_id, tool_name);

        if !self.allowed_tools.is_empty()
            && !self
                .allowed_tools
                .iter()
                .any(|p| p.matches(&namespaced) || p.matches(tool_name))
        {
            return self.log_decision(
                &namespaced,
                BlockDecision::blocked(format!("Tool {:?} is not in allowedTools", namespaced)),
            );
        }
        if let Some(pattern) = self
            .blocked_tools
            .iter()
            .find(|p| p.matches(&namespaced) || p.matches(tool_name))
        {
            return self.log_decision(
                &namespaced,
                BlockDecision::blocked(format!(
                    "Tool {:?} matches blockedTools pattern {:?}",
                    namespaced,
                    pattern.raw()
                )),
            );
        }
        BlockDecision::allowed()
    }

    /// Whether the user has disabled a tool's short name for a server
    pub fn is_user_disabled(&self, package_id: &str, tool_name: &str) -> bool {
        self.user_disabled
            .get(package_id)
            .map(|set| set.contains(tool_name))
            .unwrap_or(false)
    }

    /// Display annotation combining the security gate with the
    /// user-disabled overlay; the security reason takes precedence.
    pub fn annotate_tool(&self, package_id: &str, tool_name: &str) -> ToolAnnotation {
        let decision = self.is_tool_blocked(package_id, tool_name);
        if decision.blocked {
            return ToolAnnotation {
                blocked: true,
                reason: decision.reason,
                user_disabled: false,
            };
        }
        if self.is_user_disabled(package_id, tool_name) {
            return ToolAnnotation {
                blocked: true,
                reason: Some("Disabled by user".to_string()),
                user_disabled: true,
            };
        }
        ToolAnnotation {
            blocked: false,
            reason: None,
            user_disabled: false,
        }
    }

    /// Stable hash of the user-disabled set, folded into the published
    /// catalog ETag so consumers invalidate when the overlay changes.
    pub fn disabled_hash(&self) -> String {
        let mut lines: Vec<String> = self
            .user_disabled
            .iter()
            .flat_map(|(server, tools)| tools.iter().map(move |t| format!("{}:{}", server, t)))
            .collect();
        lines.sort();

        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }

    fn log_decision(&self, subject: &str, decision: BlockDecision) -> BlockDecision {
        if self.log_blocked_attempts && decision.blocked {
            tracing::warn!(
                subject,
                reason = decision.reason.as_deref().unwrap_or(""),
                "blocked by security policy"
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        blocked_tools: &[&str],
        blocked_packages: &[&str],
        allowed_tools: &[&str],
        allowed_packages: &[&str],
    ) -> SecurityConfig {
        SecurityConfig {
            blocked_tools: blocked_tools.iter().map(|s| s.to_string()).collect(),
            blocked_packages: blocked_packages.iter().map(|s| s.to_string()).collect(),
            allowed_tools: allowed_tools.iter().map(|s| s.to_string()).collect(),
            allowed_packages: allowed_packages.iter().map(|s| s.to_string()).collect(),
            log_blocked_attempts: None,
        }
    }

    #[test]
    fn test_no_policy_allows_everything() {
        let policy = SecurityPolicy::compile(&config(&[], &[], &[], &[]), HashMap::new());
        assert!(!policy.is_package_blocked("anything").blocked);
        assert!(!policy.is_tool_blocked("pkg", "tool").blocked);
    }

    #[test]
    fn test_allowlist_gates_packages() {
        let policy = SecurityPolicy::compile(&config(&[], &[], &[], &["fs", "web"]), HashMap::new());
        assert!(!policy.is_package_blocked("fs").blocked);
        let decision = policy.is_package_blocked("other");
        assert!(decision.blocked);
        assert!(decision.reason.unwrap().contains("allowedPackages"));
    }

    #[test]
    fn test_blocklist_wins_over_allowlist() {
        let policy = SecurityPolicy::compile(&config(&[], &["fs"], &[], &["fs"]), HashMap::new());
        assert!(policy.is_package_blocked("fs").blocked);
    }

    #[test]
    fn test_tool_check_matches_both_forms() {
        let namespaced = SecurityPolicy::compile(&config(&["fs__rm"], &[], &[], &[]), HashMap::new());
        assert!(namespaced.is_tool_blocked("fs", "rm").blocked);

        let bare = SecurityPolicy::compile(&config(&["rm"], &[], &[], &[]), HashMap::new());
        assert!(bare.is_tool_blocked("fs", "rm").blocked);
        assert!(!bare.is_tool_blocked("fs", "ls").blocked);
    }

    #[test]
    fn test_user_disabled_annotation() {
        let mut disabled = HashMap::new();
        disabled.insert("fs".to_string(), BTreeSet::from(["rm".to_string()]));
        let policy = SecurityPolicy::compile(&config(&[], &[], &[], &[]), disabled);

        let annotation = policy.annotate_tool("fs", "rm");
        assert!(annotation.blocked);
        assert!(annotation.user_disabled);
        assert_eq!(annotation.reason.as_deref(), Some("Disabled by user"));

        let clean = policy.annotate_tool("fs", "ls");
        assert!(!clean.blocked);
        assert!(!clean.user_disabled);
    }

    #[test]
    fn test_security_reason_beats_user_disabled() {
        let mut disabled = HashMap::new();
        disabled.insert("fs".to_string(), BTreeSet::from(["rm".to_string()]));
        let policy = SecurityPolicy::compile(&config(&["fs__rm"], &[], &[], &[]), disabled);

        let annotation = policy.annotate_tool("fs", "rm");
        assert!(annotation.blocked);
        assert!(!annotation.user_disabled);
        assert!(annotation.reason.unwrap().contains("blockedTools"));
    }

    #[test]
    fn test_disabled_hash_is_stable_and_sensitive() {
        let mut a = HashMap::new();
        a.insert("fs".to_string(), BTreeSet::from(["rm".to_string(), "mv".to_string()]));
        let mut b = HashMap::new();
        b.insert("fs".to_string(), BTreeSet::from(["mv".to_string(), "rm".to_string()]));

        let empty_config = config(&[], &[], &[], &[]);
        let hash_a = SecurityPolicy::compile(&empty_config, a).disabled_hash();
        let hash_b = SecurityPolicy::compile(&empty_config, b).disabled_hash();
        assert_eq!(hash_a, hash_b);

        let hash_empty = SecurityPolicy::compile(&empty_config, HashMap::new()).disabled_hash();
        assert_ne!(hash_a, hash_empty);
    }

    #[test]
    fn test_regex_patterns_in_policy() {
        let policy =
            SecurityPolicy::compile(&config(&["/^shell__/"], &[], &[], &[]), HashMap::new());
        assert!(policy.is_tool_blocked("shell", "exec").blocked);
        assert!(!policy.is_tool_blocked("fs", "exec").blocked);
    }
}
