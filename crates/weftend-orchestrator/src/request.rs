//! Safe-run request shape and preconditions (§4.5 "Inputs" + "Preconditions").

use camino::{Utf8Path, Utf8PathBuf};
use weftend_adapters::AdapterSelection;
use weftend_policy::{load_policy, CanonicalPolicy, Profile};
use weftend_util::error::WeftEndError;
use weftend_util::paths::paths_overlap;

/// `{inputPath, outDir, policyPath?, profile, executeRequested, withholdExec,
/// adapter, enabledPlugins, scriptPath?}` (§4.5).
#[derive(Debug, Clone)]
pub struct SafeRunRequest {
    pub input_path: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub policy_path: Option<Utf8PathBuf>,
    pub profile: Profile,
    pub execute_requested: bool,
    pub withhold_exec: bool,
    pub adapter: AdapterSelection,
    pub enabled_plugins: Vec<String>,
    pub script_path: Option<Utf8PathBuf>,
}

const NORMALIZED_ARTIFACT_LEAF: &str = "email_export";
const MAX_METADATA_FILE_BYTES: u64 = 1024 * 1024;

#[derive(serde::Deserialize)]
struct AdapterManifest {
    #[serde(default, rename = "requiredFiles")]
    required_files: Vec<String>,
}

/// Validated outcome of the precondition checks: the input exists, a
/// normalized-artifact directory (if any) is structurally sound, and the
/// policy has been loaded and canonicalized.
#[derive(Debug)]
pub struct Preconditions {
    pub canonical_policy: CanonicalPolicy,
}

/// Run every §4.5 precondition in the documented order, fail-closing on the
/// first violation with its documented reason code.
pub fn check_preconditions(request: &SafeRunRequest) -> Result<Preconditions, WeftEndError> {
    if request.execute_requested && request.withhold_exec {
        return Err(WeftEndError::input(
            "INPUT_INVALID",
            "--execute and --withhold-exec are mutually exclusive",
        ));
    }

    if !request.input_path.exists() {
        return Err(WeftEndError::input(
            "INPUT_MISSING",
            format!("input path does not exist: {}", request.input_path),
        ));
    }

    if is_normalized_artifact_leaf(&request.input_path) {
        validate_normalized_artifact(&request.input_path)?;
    }

    let canonical_policy = load_policy(request.policy_path.as_deref())?;

    check_out_dir_conflicts(request)?;

    if request.out_dir.exists() && !request.out_dir.is_dir() {
        return Err(WeftEndError::input(
            "SAFE_RUN_OUT_PATH_NOT_DIRECTORY",
            format!("output path exists and is not a directory: {}", request.out_dir),
        ));
    }

    Ok(Preconditions { canonical_policy })
}

fn is_normalized_artifact_leaf(path: &Utf8Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .is_some_and(|leaf| leaf.to_lowercase() == NORMALIZED_ARTIFACT_LEAF)
}

fn validate_normalized_artifact(root: &Utf8Path) -> Result<(), WeftEndError> {
    let manifest_path = root.join("adapter_manifest.json");
    let content = std::fs::read_to_string(manifest_path.as_std_path()).map_err(|e| {
        WeftEndError::NormalizedArtifact {
            code: "ADAPTER_NORMALIZATION_INVALID".to_string(),
            message: format!("failed to read adapter_manifest.json: {e}"),
        }
    })?;
    let manifest: AdapterManifest = serde_json::from_str(&content).map_err(|e| {
        WeftEndError::NormalizedArtifact {
            code: "ADAPTER_NORMALIZATION_INVALID".to_string(),
            message: format!("failed to parse adapter_manifest.json: {e}"),
        }
    })?;
    for required in &manifest.required_files {
        if !root.join(required).exists() {
            return Err(WeftEndError::NormalizedArtifact {
                code: "ADAPTER_NORMALIZATION_INVALID".to_string(),
                message: format!("required file missing from normalized artifact: {required}"),
            });
        }
    }
    Ok(())
}

fn check_out_dir_conflicts(request: &SafeRunRequest) -> Result<(), WeftEndError> {
    if paths_overlap(&request.out_dir, &request.input_path) {
        return Err(WeftEndError::input(
            "SAFE_RUN_OUT_CONFLICTS_INPUT",
            "out dir overlaps input path",
        ));
    }
    if let Some(policy_path) = &request.policy_path {
        if paths_overlap(&request.out_dir, policy_path) {
            return Err(WeftEndError::input(
                "SAFE_RUN_OUT_CONFLICTS_POLICY",
                "out dir overlaps policy path",
            ));
        }
    }
    if let Some(script_path) = &request.script_path {
        if paths_overlap(&request.out_dir, script_path) {
            return Err(WeftEndError::input(
                "SAFE_RUN_OUT_CONFLICTS_SCRIPT",
                "out dir overlaps script path",
            ));
        }
    }
    if let Ok(disable_file) = std::env::var("WEFTEND_ADAPTER_DISABLE_FILE") {
        let disable_path = Utf8PathBuf::from(disable_file);
        if paths_overlap(&request.out_dir, &disable_path) {
            return Err(WeftEndError::input(
                "SAFE_RUN_OUT_CONFLICTS_ADAPTER_POLICY_FILE",
                "out dir overlaps adapter maintenance policy file",
            ));
        }
    }
    Ok(())
}

/// Whether more than a `.stage` sibling already sits at `out_dir` before this
/// run starts (§4.5 staged write protocol step 1).
#[must_use]
pub fn out_dir_has_preexisting_output(out_dir: &Utf8Path) -> bool {
    out_dir
        .read_dir_utf8()
        .is_ok_and(|mut entries| entries.next().is_some())
}

#[must_use]
pub const fn max_metadata_file_bytes() -> u64 {
    MAX_METADATA_FILE_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn base_request(input: Utf8PathBuf, out: Utf8PathBuf) -> SafeRunRequest {
        SafeRunRequest {
            input_path: input,
            out_dir: out,
            policy_path: None,
            profile: Profile::Generic,
            execute_requested: false,
            withhold_exec: false,
            adapter: AdapterSelection::Auto,
            enabled_plugins: vec![],
            script_path: None,
        }
    }

    #[test]
    fn missing_input_fails_closed() {
        let dir = TempDir::new().unwrap();
        let req = base_request(
            utf8(dir.path()).join("nope"),
            utf8(dir.path()).join("out"),
        );
        let err = check_preconditions(&req).unwrap_err();
        assert_eq!(err.reason_code(), Some("INPUT_MISSING"));
    }

    #[test]
    fn execute_and_withhold_are_mutually_exclusive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut req = base_request(utf8(dir.path()).join("a.txt"), utf8(dir.path()).join("out"));
        req.execute_requested = true;
        req.withhold_exec = true;
        let err = check_preconditions(&req).unwrap_err();
        assert_eq!(err.reason_code(), Some("INPUT_INVALID"));
    }

    #[test]
    fn out_dir_overlapping_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/a.txt"), b"hi").unwrap();
        let req = base_request(utf8(dir.path()).join("target"), utf8(dir.path()).join("target"));
        let err = check_preconditions(&req).unwrap_err();
        assert_eq!(err.reason_code(), Some("SAFE_RUN_OUT_CONFLICTS_INPUT"));
    }

    #[test]
    fn normalized_artifact_missing_required_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("email_export");
        fs::create_dir_all(&export).unwrap();
        fs::write(
            export.join("adapter_manifest.json"),
            br#"{"requiredFiles":["index.mbox"]}"#,
        )
        .unwrap();
        let req = base_request(utf8(&export), utf8(dir.path()).join("out"));
        let err = check_preconditions(&req).unwrap_err();
        assert_eq!(err.reason_code(), Some("ADAPTER_NORMALIZATION_INVALID"));
    }

    #[test]
    fn valid_input_and_default_policy_succeed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let req = base_request(utf8(dir.path()).join("a.txt"), utf8(dir.path()).join("out"));
        let result = check_preconditions(&req).unwrap();
        assert!(result.canonical_policy.policy_id.starts_with("blake3:"));
    }
}
