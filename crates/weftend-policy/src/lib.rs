//! `WeftEndPolicy` model and loader (§3 `WeftEndPolicy`, §4.5 precondition:
//! "Policy file loads, parses, and validates; policy is then canonicalized
//! and `policyId` is computed").

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use weftend_util::canon::digest_canonical;
use weftend_util::error::WeftEndError;

/// Deployment profile selected for a run (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Web,
    Mod,
    Generic,
}

impl Profile {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mod => "mod",
            Self::Generic => "generic",
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = WeftEndError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "mod" => Ok(Self::Mod),
            "generic" => Ok(Self::Generic),
            other => Err(WeftEndError::input(
                "INPUT_INVALID",
                format!("unknown profile: {other}"),
            )),
        }
    }
}

/// A single allow/deny rule keyed by an arbitrary rule name (e.g. an adapter
/// class or reason-code family).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyRule {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Deny thresholds consumed by shadow-audit (§4.11) and the adapter
/// maintenance policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DenyThresholds {
    #[serde(flatten)]
    pub by_family: BTreeMap<String, u64>,
}

/// The parsed, pre-canonicalization policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftEndPolicy {
    pub profile: Profile,
    #[serde(default)]
    pub rules: BTreeMap<String, PolicyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_thresholds: Option<DenyThresholds>,
}

/// A policy after canonicalization, carrying its computed `policyId`.
#[derive(Debug, Clone)]
pub struct CanonicalPolicy {
    pub policy: WeftEndPolicy,
    pub policy_id: String,
}

/// Load a policy document from `path`, or return the generic default policy
/// when `path` is `None` (§4.5: a missing `--policy` flag still produces a
/// deterministic, valid policy so raw-branch runs remain exercisable).
pub fn load_policy(path: Option<&Utf8Path>) -> Result<CanonicalPolicy, WeftEndError> {
    let policy = match path {
        Some(path) => read_policy_file(path)?,
        None => default_policy(),
    };
    canonicalize(policy)
}

fn read_policy_file(path: &Utf8Path) -> Result<WeftEndPolicy, WeftEndError> {
    if !path.exists() {
        return Err(WeftEndError::policy(
            "POLICY_MISSING",
            format!("policy file not found: {path}"),
        ));
    }
    let content = std::fs::read_to_string(path.as_std_path()).map_err(|e| {
        WeftEndError::policy("POLICY_MISSING", format!("failed to read policy file: {e}"))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        WeftEndError::policy("POLICY_INVALID", format!("failed to parse policy JSON: {e}"))
    })
}

/// The built-in generic policy used when no `--policy` path is supplied.
#[must_use]
pub fn default_policy() -> WeftEndPolicy {
    WeftEndPolicy {
        profile: Profile::Generic,
        rules: BTreeMap::new(),
        deny_thresholds: None,
    }
}

fn canonicalize(policy: WeftEndPolicy) -> Result<CanonicalPolicy, WeftEndError> {
    let policy_id = digest_canonical(&policy).map_err(|e| {
        WeftEndError::policy(
            "POLICY_INVALID",
            format!("failed to canonicalize policy: {e}"),
        )
    })?;
    Ok(CanonicalPolicy { policy, policy_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_policy_canonicalizes() {
        let canonical = canonicalize(default_policy()).unwrap();
        assert!(canonical.policy_id.starts_with("blake3:"));
    }

    #[test]
    fn missing_policy_path_is_fatal() {
        let missing = Utf8Path::new("/nonexistent/policy.json");
        let err = load_policy(Some(missing)).unwrap_err();
        assert_eq!(err.reason_code(), Some("POLICY_MISSING"));
    }

    #[test]
    fn invalid_policy_json_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let err = load_policy(Some(path)).unwrap_err();
        assert_eq!(err.reason_code(), Some("POLICY_INVALID"));
    }

    #[test]
    fn same_policy_content_yields_same_id() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"profile":"web","rules":{{}}}}"#).unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let a = load_policy(Some(path)).unwrap();
        let b = load_policy(Some(path)).unwrap();
        assert_eq!(a.policy_id, b.policy_id);
    }
}
