//! Release branch (§4.5.a): load release metadata, decide WITHHELD vs host
//! execution, and surface fatal release codes as a DENY analysis verdict.

use std::collections::BTreeMap;

use camino::Utf8Path;
use weftend_mint::{HostRunReceipt, HostRunner};
use weftend_util::canon::{digest_bytes, digest_canonical};
use weftend_util::error::WeftEndError;

use crate::request::max_metadata_file_bytes;

const RELEASE_META_FILES: &[&str] = &[
    "release_manifest.json",
    "runtime_bundle.json",
    "evidence.json",
    "release_public_key.json",
];

pub const FATAL_RELEASE_CODE_PREFIXES: &[&str] = &[
    "VERIFY_DENIED",
    "RELEASE_",
    "EVIDENCE_",
    "PUBLIC_KEY_",
    "RUNTIME_BUNDLE_",
    "HOST_INPUT_OVERSIZE",
];

#[must_use]
pub fn is_fatal_release_code(code: &str) -> bool {
    FATAL_RELEASE_CODE_PREFIXES
        .iter()
        .any(|prefix| code == *prefix || code.starts_with(prefix))
}

/// One release metadata file, loaded and size-capped.
pub struct ReleaseMetaFile {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

/// Result of loading the four release metadata files (§4.5.a): either every
/// file loaded cleanly, or the first fatal reason code encountered.
pub enum ReleaseMetaOutcome {
    Loaded(Vec<ReleaseMetaFile>),
    Fatal { reason_code: String },
}

/// Load `release_manifest.json`, `runtime_bundle.json`, `evidence.json`, and
/// `release_public_key.json` from `release_dir`, each capped at 1 MiB.
#[must_use]
pub fn load_release_meta(release_dir: &Utf8Path) -> ReleaseMetaOutcome {
    let mut files = Vec::new();
    for name in RELEASE_META_FILES {
        let path = release_dir.join(name);
        let metadata = match std::fs::metadata(path.as_std_path()) {
            Ok(m) => m,
            Err(_) => {
                return ReleaseMetaOutcome::Fatal {
                    reason_code: release_missing_code(name),
                }
            }
        };
        if metadata.len() > max_metadata_file_bytes() {
            return ReleaseMetaOutcome::Fatal {
                reason_code: release_oversize_code(name),
            };
        }
        let bytes = match std::fs::read(path.as_std_path()) {
            Ok(b) => b,
            Err(_) => {
                return ReleaseMetaOutcome::Fatal {
                    reason_code: release_missing_code(name),
                }
            }
        };
        if serde_json::from_slice::<serde_json::Value>(&bytes).is_err() {
            return ReleaseMetaOutcome::Fatal {
                reason_code: release_invalid_code(name),
            };
        }
        files.push(ReleaseMetaFile { name, bytes });
    }
    ReleaseMetaOutcome::Loaded(files)
}

fn release_missing_code(name: &str) -> String {
    match name {
        "release_manifest.json" => "RELEASE_MANIFEST_MISSING".to_string(),
        "runtime_bundle.json" => "RUNTIME_BUNDLE_MISSING".to_string(),
        "evidence.json" => "EVIDENCE_MISSING".to_string(),
        "release_public_key.json" => "PUBLIC_KEY_MISSING".to_string(),
        other => format!("RELEASE_FILE_MISSING({other})"),
    }
}

fn release_invalid_code(name: &str) -> String {
    match name {
        "release_manifest.json" => "RELEASE_MANIFEST_INVALID".to_string(),
        "runtime_bundle.json" => "RUNTIME_BUNDLE_INVALID".to_string(),
        "evidence.json" => "EVIDENCE_INVALID".to_string(),
        "release_public_key.json" => "PUBLIC_KEY_INVALID".to_string(),
        other => format!("RELEASE_FILE_INVALID({other})"),
    }
}

fn release_oversize_code(name: &str) -> String {
    match name {
        "release_manifest.json" => "RELEASE_MANIFEST_OVERSIZE".to_string(),
        "runtime_bundle.json" => "RUNTIME_BUNDLE_OVERSIZE".to_string(),
        "evidence.json" => "EVIDENCE_OVERSIZE".to_string(),
        "release_public_key.json" => "PUBLIC_KEY_OVERSIZE".to_string(),
        _ => "HOST_INPUT_OVERSIZE".to_string(),
    }
}

/// Content-anchored digest of a loaded release's metadata (§1, §3
/// "digest-anchored record"): a canonical record mapping each release meta
/// file name to its own content digest, then digested as a whole. Two
/// releases with identical metadata content always yield the same digest
/// regardless of where `release_dir` sits on disk.
pub fn release_dir_digest(files: &[ReleaseMetaFile]) -> Result<String, WeftEndError> {
    let record: BTreeMap<&str, String> = files
        .iter()
        .map(|f| (f.name, digest_bytes(&f.bytes)))
        .collect();
    digest_canonical(&record)
        .map_err(|e| WeftEndError::Internal(format!("release dir digest failed: {e}")))
}

/// Run the release branch's host-or-withhold decision once metadata has
/// loaded cleanly.
pub fn run_or_withhold<R: HostRunner>(
    runner: &R,
    execute_requested: bool,
    release_dir: &Utf8Path,
    host_out_dir: &Utf8Path,
) -> Result<Option<HostRunReceipt>, WeftEndError> {
    if execute_requested {
        runner.host_run_strict(release_dir, host_out_dir).map(Some)
    } else {
        Ok(None)
    }
}
