//! Library view-state (§4.9): per-target run history and baseline tracking
//! under `<libraryRoot>/<targetKey>/`, grounded on the teacher's
//! `xchecker-gate` pattern of recomputing derived state from the current
//! directory listing rather than trusting a cached index.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use weftend_receipt::{BlockedState, CompareVerdict, HostSelfStatus, LibraryViewKey, LibraryViewState, RunReceipt};
use weftend_util::atomic::write_pointer_atomic;
use weftend_util::canon::sort_unique_bounded;
use weftend_util::error::WeftEndError;

use crate::compare::{bucket_letter, compare_run_receipts};

const MAX_LAST_N: usize = 8;
const MAX_BLOCKED_REASONS: usize = 8;
const MAX_TARGET_KEY_BYTES: usize = 120;

/// Sanitize a raw leaf name into a stable `targetKey` (§9 Open Question:
/// "collapse runs of non-`[A-Za-z0-9._-]` to `_`, then trim, then bound to
/// 120 bytes").
#[must_use]
pub fn sanitize_target_key(raw: &str) -> String {
    let mut out = String::new();
    let mut last_was_underscore = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            last_was_underscore = ch == '_';
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let mut bounded = trimmed.to_string();
    bounded.truncate(MAX_TARGET_KEY_BYTES);
    if bounded.is_empty() {
        "_".to_string()
    } else {
        bounded
    }
}

fn target_dir(library_root: &Utf8Path, target_key: &str) -> Utf8PathBuf {
    library_root.join(target_key)
}

fn view_dir(library_root: &Utf8Path, target_key: &str) -> Utf8PathBuf {
    target_dir(library_root, target_key).join("view")
}

/// List sibling `run_XXXXXX` directories under a target in canonical
/// (lexicographic) order (§4.9: "List sibling run directories in canonical
/// order to form the authoritative set `runIds`").
pub fn list_run_ids(library_root: &Utf8Path, target_key: &str) -> Result<Vec<String>, WeftEndError> {
    let dir = target_dir(library_root, target_key);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    let entries = std::fs::read_dir(dir.as_std_path())
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: format!("failed to list target directory: {e}") })?;
    for entry in entries {
        let entry = entry.map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: e.to_string() })?;
        let Ok(name) = entry.file_name().into_string() else { continue };
        if name.starts_with("run_") && entry.path().is_dir() {
            ids.push(name);
        }
    }
    ids.sort();
    Ok(ids)
}

fn run_receipt_path(library_root: &Utf8Path, target_key: &str, run_id: &str) -> Utf8PathBuf {
    target_dir(library_root, target_key).join(run_id).join("run_receipt.json")
}

/// Persist the slim per-run projection consumed by the compare engine.
pub fn write_run_receipt(
    library_root: &Utf8Path,
    target_key: &str,
    run_id: &str,
    receipt: &RunReceipt,
) -> Result<(), WeftEndError> {
    let path = run_receipt_path(library_root, target_key, run_id);
    let body = weftend_util::canon::canonical_string(receipt)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize run receipt: {e}")))?;
    write_pointer_atomic(&path, &body)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_LATEST_WRITE_FAILED".to_string(), message: e.to_string() })
}

/// Load a previously persisted run receipt.
pub fn load_run_receipt(library_root: &Utf8Path, target_key: &str, run_id: &str) -> Result<RunReceipt, WeftEndError> {
    let path = run_receipt_path(library_root, target_key, run_id);
    let content = std::fs::read_to_string(path.as_std_path())
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: format!("failed to read run receipt {path}: {e}") })?;
    serde_json::from_str(&content)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: format!("failed to parse run receipt {path}: {e}") })
}

fn read_pointer(path: &Utf8Path) -> Option<String> {
    std::fs::read_to_string(path.as_std_path())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Per-run facts that are not captured by `RunReceipt` but feed the blocked
/// determination (§4.9: "privacyVerdict=FAIL, hostSelfStatus∈{UNVERIFIED,
/// MISSING}, any `hostSelfReasonCodes` present").
pub struct RunLibraryFacts {
    pub privacy_fail: bool,
    pub host_self_status: Option<HostSelfStatus>,
    pub host_self_reason_codes: Vec<String>,
}

/// Apply one safe-run completion to the library view-state for its target
/// (§4.9). Returns the rebuilt `LibraryViewState`.
pub fn update_view_after_run(
    library_root: &Utf8Path,
    target_key: &str,
    run_id: &str,
    run_receipt: &RunReceipt,
    facts: &RunLibraryFacts,
) -> Result<LibraryViewState, WeftEndError> {
    write_run_receipt(library_root, target_key, run_id, run_receipt)?;

    let view_dir = view_dir(library_root, target_key);
    let run_ids = list_run_ids(library_root, target_key)?;
    let run_id_set: BTreeSet<&String> = run_ids.iter().collect();

    let baseline_path = view_dir.join("baseline.txt");
    let latest_path = view_dir.join("latest.txt");
    let blocked_path = view_dir.join("blocked.txt");
    let state_path = view_dir.join("view_state.json");

    let baseline_run_id = match read_pointer(&baseline_path) {
        Some(existing) if run_id_set.contains(&existing) => existing,
        _ => run_ids.first().cloned().unwrap_or_else(|| run_id.to_string()),
    };
    write_pointer_atomic(&baseline_path, &baseline_run_id)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_BASELINE_WRITE_FAILED".to_string(), message: e.to_string() })?;

    write_pointer_atomic(&latest_path, run_id)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_LATEST_WRITE_FAILED".to_string(), message: e.to_string() })?;

    let already_blocked = blocked_path.exists();
    let should_block = !already_blocked
        && (facts.privacy_fail
            || matches!(facts.host_self_status, Some(HostSelfStatus::Unverified) | Some(HostSelfStatus::Missing))
            || !facts.host_self_reason_codes.is_empty());
    if should_block {
        let mut reasons = facts.host_self_reason_codes.clone();
        if facts.privacy_fail {
            reasons.push("PRIVACY_LINT_FAIL".to_string());
        }
        let reasons = sort_unique_bounded(reasons, MAX_BLOCKED_REASONS);
        write_pointer_atomic(&blocked_path, &reasons.join(","))
            .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: e.to_string() })?;
    }
    let blocked = read_pointer(&blocked_path).map(|line| BlockedState {
        run_id: run_id.to_string(),
        reason_codes: line.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
    });

    let prior_last_n = load_state(&state_path).map(|s| s.last_n).unwrap_or_default();
    let mut last_n: Vec<String> = prior_last_n.into_iter().filter(|id| run_id_set.contains(id)).collect();
    if !last_n.contains(&run_id.to_string()) {
        last_n.push(run_id.to_string());
    }
    if last_n.len() > MAX_LAST_N {
        let overflow = last_n.len() - MAX_LAST_N;
        last_n.drain(0..overflow);
    }

    let baseline_receipt = load_run_receipt(library_root, target_key, &baseline_run_id).ok();
    let mut keys = Vec::new();
    for entry_run_id in &last_n {
        let Ok(entry_receipt) = load_run_receipt(library_root, target_key, entry_run_id) else {
            continue;
        };
        let key = match &baseline_receipt {
            Some(baseline) => {
                let outcome = compare_run_receipts(baseline, &entry_receipt);
                let buckets: Vec<String> = outcome
                    .change_buckets
                    .iter()
                    .map(|b| bucket_letter(b).to_string())
                    .collect();
                LibraryViewKey {
                    verdict_vs_baseline: outcome.verdict,
                    buckets: sort_unique_bounded(buckets, 16),
                    artifact_digest: entry_receipt.artifact_digest.clone(),
                    result: entry_receipt.result,
                }
            }
            None => LibraryViewKey {
                verdict_vs_baseline: CompareVerdict::Same,
                buckets: Vec::new(),
                artifact_digest: entry_receipt.artifact_digest.clone(),
                result: entry_receipt.result,
            },
        };
        keys.push(key);
    }

    let state = LibraryViewState {
        schema_version: 0,
        target_key: target_key.to_string(),
        baseline_run_id,
        latest_run_id: run_id.to_string(),
        blocked,
        last_n,
        keys,
    };
    persist_state(&state_path, &state)?;
    Ok(state)
}

fn load_state(path: &Utf8Path) -> Option<LibraryViewState> {
    let content = std::fs::read_to_string(path.as_std_path()).ok()?;
    serde_json::from_str(&content).ok()
}

fn persist_state(path: &Utf8Path, state: &LibraryViewState) -> Result<(), WeftEndError> {
    let body = weftend_util::canon::canonical_string(state)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize view state: {e}")))?;
    write_pointer_atomic(path, &body)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: e.to_string() })
}

/// Accept the latest run as the new baseline and clear any blocked record
/// (§4.9 accept-baseline operator operation).
pub fn accept_baseline(library_root: &Utf8Path, target_key: &str) -> Result<LibraryViewState, WeftEndError> {
    let view_dir = view_dir(library_root, target_key);
    let state_path = view_dir.join("view_state.json");
    let mut state = load_state(&state_path).ok_or_else(|| {
        WeftEndError::input("INPUT_INVALID", format!("no view-state for target {target_key}"))
    })?;

    state.baseline_run_id = state.latest_run_id.clone();
    state.blocked = None;
    write_pointer_atomic(&view_dir.join("baseline.txt"), &state.baseline_run_id)
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_BASELINE_WRITE_FAILED".to_string(), message: e.to_string() })?;
    let _ = std::fs::remove_file(view_dir.join("blocked.txt").as_std_path());

    let baseline_receipt = load_run_receipt(library_root, target_key, &state.baseline_run_id)?;
    let mut keys = Vec::new();
    for run_id in &state.last_n {
        let Ok(entry_receipt) = load_run_receipt(library_root, target_key, run_id) else {
            continue;
        };
        let outcome = compare_run_receipts(&baseline_receipt, &entry_receipt);
        let buckets: Vec<String> = outcome.change_buckets.iter().map(|b| bucket_letter(b).to_string()).collect();
        keys.push(LibraryViewKey {
            verdict_vs_baseline: outcome.verdict,
            buckets: sort_unique_bounded(buckets, 16),
            artifact_digest: entry_receipt.artifact_digest.clone(),
            result: entry_receipt.result,
        });
    }
    state.keys = keys;
    persist_state(&state_path, &state)?;
    Ok(state)
}

/// Reject the latest run: block it with `OPERATOR_REJECT_BASELINE` without
/// moving the baseline (§4.9 reject-baseline operator operation).
pub fn reject_baseline(library_root: &Utf8Path, target_key: &str) -> Result<LibraryViewState, WeftEndError> {
    let view_dir = view_dir(library_root, target_key);
    let state_path = view_dir.join("view_state.json");
    let mut state = load_state(&state_path).ok_or_else(|| {
        WeftEndError::input("INPUT_INVALID", format!("no view-state for target {target_key}"))
    })?;

    let blocked = BlockedState {
        run_id: state.latest_run_id.clone(),
        reason_codes: vec!["OPERATOR_REJECT_BASELINE".to_string()],
    };
    write_pointer_atomic(&view_dir.join("blocked.txt"), &blocked.reason_codes.join(","))
        .map_err(|e| WeftEndError::Library { code: "LIBRARY_VIEWSTATE_WRITE_FAILED".to_string(), message: e.to_string() })?;
    state.blocked = Some(blocked);
    persist_state(&state_path, &state)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use weftend_receipt::{ExecResult, FileCountsByKind};

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn sample_receipt(digest: &str) -> RunReceipt {
        RunReceipt {
            result: ExecResult::Allow,
            exit_code: 0,
            reason_codes: vec![],
            artifact_digest: digest.to_string(),
            policy_digest: "blake3:policy".to_string(),
            external_ref_count: 0,
            unique_domain_count: 0,
            target_kind: "dir".to_string(),
            artifact_kind: "TEXT".to_string(),
            total_files: 1,
            total_bytes_bounded: 10,
            file_counts_by_kind: FileCountsByKind::default(),
            has_scripts: false,
            has_native_binaries: false,
            url_like_count: 0,
            signature_present: false,
            timestamp_present: false,
            archive_depth_max: 0,
            nested_archive_count: 0,
            boundedness_markers: vec![],
            cap_counters: BTreeMap::new(),
            denied_caps: vec![],
            host_release_status: None,
            strict_verify: false,
            strict_execute: false,
        }
    }

    fn clean_facts() -> RunLibraryFacts {
        RunLibraryFacts {
            privacy_fail: false,
            host_self_status: Some(HostSelfStatus::Ok),
            host_self_reason_codes: vec![],
        }
    }

    #[test]
    fn sanitize_target_key_collapses_and_trims() {
        assert_eq!(sanitize_target_key("My Export!!v2"), "My_Export_v2");
        assert_eq!(sanitize_target_key("  /weird//"), "weird");
    }

    #[test]
    fn first_run_becomes_its_own_baseline() {
        let dir = TempDir::new().unwrap();
        let root = utf8(dir.path());
        let state = update_view_after_run(&root, "target", "run_000001", &sample_receipt("blake3:a"), &clean_facts()).unwrap();
        assert_eq!(state.baseline_run_id, "run_000001");
        assert_eq!(state.latest_run_id, "run_000001");
        assert_eq!(state.keys.len(), 1);
        assert_eq!(state.keys[0].verdict_vs_baseline, CompareVerdict::Same);
    }

    #[test]
    fn second_changed_run_compares_against_baseline() {
        let dir = TempDir::new().unwrap();
        let root = utf8(dir.path());
        update_view_after_run(&root, "target", "run_000001", &sample_receipt("blake3:a"), &clean_facts()).unwrap();
        let state = update_view_after_run(&root, "target", "run_000002", &sample_receipt("blake3:b"), &clean_facts()).unwrap();
        assert_eq!(state.baseline_run_id, "run_000001");
        assert_eq!(state.latest_run_id, "run_000002");
        let latest_key = state.keys.iter().find(|k| state.last_n.last() == Some(&"run_000002".to_string())).unwrap();
        assert_eq!(latest_key.verdict_vs_baseline, CompareVerdict::Changed);
        assert!(latest_key.buckets.contains(&"D".to_string()));
    }

    #[test]
    fn unverified_host_status_blocks_run() {
        let dir = TempDir::new().unwrap();
        let root = utf8(dir.path());
        let facts = RunLibraryFacts {
            privacy_fail: false,
            host_self_status: Some(HostSelfStatus::Unverified),
            host_self_reason_codes: vec!["HOST_RUN_NOT_SANDBOXED".to_string()],
        };
        let state = update_view_after_run(&root, "target", "run_000001", &sample_receipt("blake3:a"), &facts).unwrap();
        assert!(state.blocked.is_some());
    }

    #[test]
    fn accept_baseline_moves_pointer_to_latest() {
        let dir = TempDir::new().unwrap();
        let root = utf8(dir.path());
        update_view_after_run(&root, "target", "run_000001", &sample_receipt("blake3:a"), &clean_facts()).unwrap();
        update_view_after_run(&root, "target", "run_000002", &sample_receipt("blake3:b"), &clean_facts()).unwrap();
        let state = accept_baseline(&root, "target").unwrap();
        assert_eq!(state.baseline_run_id, "run_000002");
        assert!(state.blocked.is_none());
    }
}
