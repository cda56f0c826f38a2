//! SCM adapter (class `scm`, §4.4.i): native `.git` directories and
//! `gitdir:` worktree pointers.

use camino::Utf8Path;
use weftend_capture::{ArtifactCapture, CaptureKind};

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded};
use crate::{Adapter, AdapterResult};

const MAX_REF_FILE_BYTES: u64 = 4096;

pub struct ScmAdapter;

impl Adapter for ScmAdapter {
    fn id(&self) -> &'static str {
        "scm_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "scm"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        capture.kind == CaptureKind::Dir && capture.entries.iter().any(|e| e.path == "HEAD")
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        let head_path = path.join("HEAD");
        let head_bytes = match read_bounded(&head_path, MAX_REF_FILE_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("SCM_REF_UNRESOLVED", e.to_string()),
        };
        let head_text = String::from_utf8_lossy(&head_bytes).trim().to_string();

        let ref_heads: Vec<&str> = capture
            .entries
            .iter()
            .map(|e| e.path.as_str())
            .filter(|p| p.starts_with("refs/heads/"))
            .collect();

        let has_pack = capture.entries.iter().any(|e| e.path.starts_with("objects/pack/") && e.path.ends_with(".pack"));

        let resolves = |branch_ref: &str| -> bool {
            let Some(branch_entry) = capture.entries.iter().find(|e| e.path == branch_ref) else {
                return false;
            };
            let Ok(bytes) = read_bounded(&path.join(branch_ref), MAX_REF_FILE_BYTES) else {
                return false;
            };
            let hash = String::from_utf8_lossy(&bytes).trim().to_string();
            let _ = branch_entry;
            if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return false;
            }
            let object_path = format!("objects/{}/{}", &hash[0..2], &hash[2..]);
            capture.entries.iter().any(|e| e.path == object_path) || has_pack
        };

        let results: Vec<bool> = ref_heads.iter().map(|r| resolves(r)).collect();
        let resolved_count = results.iter().filter(|r| **r).count();

        if let Some(branch) = head_text.strip_prefix("ref: ") {
            if !ref_heads.contains(&branch) {
                return fail("SCM_REF_UNRESOLVED", format!("HEAD targets {branch} which has no ref file"));
            }
        }

        if ref_heads.is_empty() {
            return fail("SCM_REF_UNRESOLVED", "no refs/heads/* entries present to resolve HEAD against");
        }
        if resolved_count == 0 {
            return fail("SCM_REF_UNRESOLVED", "no refs/heads/* entries resolve to an object");
        }
        if resolved_count != ref_heads.len() {
            return fail("SCM_REF_UNRESOLVED", "some refs resolve while others do not (partial state)");
        }

        ok(
            self.id(),
            AdapterMode::Strict,
            format!("{} ref(s) under refs/heads resolve to objects", ref_heads.len()),
            ref_heads.iter().map(|s| s.to_string()).collect(),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_capture::{capture, CaptureLimits};

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn make_git_dir(dir: &TempDir, hash: &str) {
        fs::write(dir.path().join("HEAD"), b"ref: refs/heads/main\n").unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main"), format!("{hash}\n")).unwrap();
        let (prefix, rest) = hash.split_at(2);
        fs::create_dir_all(dir.path().join("objects").join(prefix)).unwrap();
        fs::write(dir.path().join("objects").join(prefix).join(rest), b"loose object").unwrap();
    }

    #[test]
    fn resolves_head_to_object() {
        let dir = TempDir::new().unwrap();
        make_git_dir(&dir, "abcd1234abcd1234abcd1234abcd1234abcd1234");
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let adapter = ScmAdapter;
        let result = adapter.validate(&utf8(dir.path()), &cap, &[]);
        assert!(result.is_ok());
    }

    #[test]
    fn fails_when_head_targets_missing_ref() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("HEAD"), b"ref: refs/heads/main\n").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let adapter = ScmAdapter;
        let result = adapter.validate(&utf8(dir.path()), &cap, &[]);
        assert_eq!(result.fail_code(), Some("SCM_REF_UNRESOLVED"));
    }

    #[test]
    fn fails_on_partial_ref_resolution() {
        let dir = TempDir::new().unwrap();
        make_git_dir(&dir, "abcd1234abcd1234abcd1234abcd1234abcd1234");
        fs::write(dir.path().join("refs/heads/feature"), "0000000000000000000000000000000000000000\n").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let adapter = ScmAdapter;
        let result = adapter.validate(&utf8(dir.path()), &cap, &[]);
        assert_eq!(result.fail_code(), Some("SCM_REF_UNRESOLVED"));
    }
}
