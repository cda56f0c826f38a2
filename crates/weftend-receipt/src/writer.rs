//! Writes a receipt into a stage directory and reports its relative path and
//! content digest, for use building `subReceipts`/operator entries.

use camino::Utf8Path;
use weftend_util::atomic::write_json_atomic;
use weftend_util::canon::{canonical_string, digest_file};
use weftend_util::error::WeftEndError;

use crate::model::SubReceiptEntry;

/// Write `value` as canonical JSON at `stage_dir/rel_path`, returning the
/// `{name, digest}` pair used to populate `subReceipts` (§4.5 step 3).
pub fn write_evidence_file<T: serde::Serialize>(
    stage_dir: &Utf8Path,
    rel_path: &str,
    value: &T,
) -> Result<SubReceiptEntry, WeftEndError> {
    let path = stage_dir.join(rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path())
            .map_err(|e| WeftEndError::Internal(format!("failed to create {parent}: {e}")))?;
    }
    let canonical = canonical_string(value)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize {rel_path}: {e}")))?;
    write_json_atomic(&path, &canonical)
        .map_err(|e| WeftEndError::Internal(format!("failed to write {path}: {e}")))?;
    let digest = digest_file(&path)
        .map_err(|e| WeftEndError::Internal(format!("failed to digest {path}: {e}")))?;
    Ok(SubReceiptEntry {
        name: rel_path.to_string(),
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn writes_and_digests_evidence() {
        let dir = TempDir::new().unwrap();
        let stage = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let entry = write_evidence_file(&stage, "analysis/disclosure.txt", &json!({"a": 1})).unwrap();
        assert_eq!(entry.name, "analysis/disclosure.txt");
        assert!(entry.digest.starts_with("blake3:"));
        assert!(stage.join("analysis/disclosure.txt").exists());
    }
}
