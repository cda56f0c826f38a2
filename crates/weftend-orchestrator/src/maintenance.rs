//! Adapter maintenance policy from the environment (§6: `WEFTEND_ADAPTER_DISABLE`,
//! `WEFTEND_ADAPTER_DISABLE_FILE`).

use weftend_adapters::MaintenancePolicy;
use weftend_util::error::WeftEndError;

const DISABLE_VAR: &str = "WEFTEND_ADAPTER_DISABLE";
const DISABLE_FILE_VAR: &str = "WEFTEND_ADAPTER_DISABLE_FILE";

/// Build the adapter maintenance policy from `WEFTEND_ADAPTER_DISABLE` (a
/// comma-separated class list) and/or `WEFTEND_ADAPTER_DISABLE_FILE` (a JSON
/// maintenance policy document). The file, when present, is authoritative;
/// the comma-separated var is merged in on top of it.
pub fn maintenance_policy_from_env() -> Result<MaintenancePolicy, WeftEndError> {
    let mut policy = match std::env::var(DISABLE_FILE_VAR) {
        Ok(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                WeftEndError::adapter(
                    "ADAPTER_POLICY_INVALID",
                    format!("failed to read {DISABLE_FILE_VAR} at {path}: {e}"),
                )
            })?;
            MaintenancePolicy::from_json(&content)?
        }
        Err(_) => MaintenancePolicy::default(),
    };

    if let Ok(classes) = std::env::var(DISABLE_VAR) {
        for class in classes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if !policy.is_disabled(class) {
                policy.disabled_classes.push(class.to_string());
            }
        }
    }
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_env_yields_empty_policy() {
        std::env::remove_var(DISABLE_VAR);
        std::env::remove_var(DISABLE_FILE_VAR);
        let policy = maintenance_policy_from_env().unwrap();
        assert!(policy.disabled_classes.is_empty());
    }
}
