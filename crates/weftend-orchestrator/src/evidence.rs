//! Evidence self-verification (§4.8): compare the declared artifact set
//! against what actually landed in the stage directory.

use std::collections::BTreeMap;

use camino::Utf8Path;
use walkdir::WalkDir;
use weftend_util::canon::digest_file;

/// One declared artifact: its stage-relative path and the digest the
/// orchestrator believes it has.
pub struct DeclaredArtifact {
    pub rel_path: String,
    pub digest: String,
}

/// Enumerate the stage directory and compare it against the declared set
/// (§4.8). Returns the sort-unique warning reason codes to attach to the
/// operator receipt; never mutates the analysis verdict.
#[must_use]
pub fn verify_evidence(stage_dir: &Utf8Path, declared: &[DeclaredArtifact]) -> Vec<String> {
    let expected: BTreeMap<&str, &str> = declared
        .iter()
        .map(|d| (d.rel_path.as_str(), d.digest.as_str()))
        .collect();

    let mut actual: Vec<String> = Vec::new();
    for entry in WalkDir::new(stage_dir.as_std_path())
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(stage_dir.as_std_path()) else {
            continue;
        };
        let Some(rel) = rel.to_str() else { continue };
        actual.push(rel.replace(std::path::MAIN_SEPARATOR, "/"));
    }
    actual.sort();

    let mut warnings = Vec::new();
    for (rel_path, digest) in &expected {
        if !actual.iter().any(|a| a == rel_path) {
            warnings.push("SAFE_RUN_EVIDENCE_MISSING".to_string());
            continue;
        }
        // Receipt files themselves are presence-only (§4.8).
        if *rel_path == "safe_run_receipt.json" || *rel_path == "operator_receipt.json" {
            continue;
        }
        let full = stage_dir.join(rel_path);
        match digest_file(&full) {
            Ok(actual_digest) if &actual_digest == digest => {}
            _ => warnings.push("SAFE_RUN_EVIDENCE_DIGEST_MISMATCH".to_string()),
        }
    }
    for rel_path in &actual {
        if !expected.contains_key(rel_path.as_str()) {
            warnings.push("SAFE_RUN_EVIDENCE_ORPHAN_OUTPUT".to_string());
            break;
        }
    }
    warnings.sort();
    warnings.dedup();
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_util::canon::digest_file;

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn complete_matching_evidence_has_no_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        let digest = digest_file(&utf8(dir.path()).join("a.json")).unwrap();
        let warnings = verify_evidence(
            &utf8(dir.path()),
            &[DeclaredArtifact { rel_path: "a.json".to_string(), digest }],
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_declared_file_warns() {
        let dir = TempDir::new().unwrap();
        let warnings = verify_evidence(
            &utf8(dir.path()),
            &[DeclaredArtifact {
                rel_path: "missing.json".to_string(),
                digest: "blake3:aaa".to_string(),
            }],
        );
        assert_eq!(warnings, vec!["SAFE_RUN_EVIDENCE_MISSING".to_string()]);
    }

    #[test]
    fn orphan_file_warns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("extra.json"), b"{}").unwrap();
        let warnings = verify_evidence(&utf8(dir.path()), &[]);
        assert_eq!(warnings, vec!["SAFE_RUN_EVIDENCE_ORPHAN_OUTPUT".to_string()]);
    }

    #[test]
    fn digest_mismatch_warns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        let warnings = verify_evidence(
            &utf8(dir.path()),
            &[DeclaredArtifact {
                rel_path: "a.json".to_string(),
                digest: "blake3:wrong".to_string(),
            }],
        );
        assert_eq!(warnings, vec!["SAFE_RUN_EVIDENCE_DIGEST_MISMATCH".to_string()]);
    }
}
