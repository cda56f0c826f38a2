//! Helpers shared by the per-class validators (§4.4.a strict-format contract).

use crate::result::AdapterResult;

/// Read a capture's single backing file bounded to `max_bytes`. Adapters
/// validate raw input bytes the capture only carries a digest for.
pub fn read_bounded(
    path: &camino::Utf8Path,
    max_bytes: u64,
) -> Result<Vec<u8>, weftend_util::error::WeftEndError> {
    use weftend_util::error::WeftEndError;
    let metadata = std::fs::metadata(path.as_std_path())
        .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
    if metadata.len() > max_bytes {
        return Err(WeftEndError::input(
            "INPUT_INVALID",
            format!("file exceeds adapter read bound: {path}"),
        ));
    }
    std::fs::read(path.as_std_path()).map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))
}

/// Fail-closed on duplicate names, case-folded collisions, or names that
/// escape the canonical root (§4.4.a).
pub fn reject_unsafe_names(names: &[String], fail_code: &str) -> Option<AdapterResult> {
    let mut seen = std::collections::HashSet::new();
    let mut seen_folded = std::collections::HashSet::new();
    for name in names {
        if name.contains("..") || name.starts_with('/') {
            return Some(fail(fail_code, format!("entry escapes canonical root: {name}")));
        }
        if !seen.insert(name.clone()) {
            return Some(fail(fail_code, format!("duplicate entry: {name}")));
        }
        let folded = name.to_lowercase();
        if !seen_folded.insert(folded) {
            return Some(fail(
                fail_code,
                format!("case-colliding entries near: {name}"),
            ));
        }
    }
    None
}

pub fn fail(fail_code: &str, message: impl Into<String>) -> AdapterResult {
    AdapterResult::Fail {
        fail_code: fail_code.to_string(),
        fail_message: message.into(),
        reason_codes: vec![fail_code.to_string()],
    }
}

pub fn ok(
    adapter_id: &str,
    mode: crate::result::AdapterMode,
    summary: impl Into<String>,
    findings: Vec<String>,
    adapter_signals: Option<crate::result::AdapterSignalsData>,
) -> AdapterResult {
    AdapterResult::Ok {
        adapter_id: adapter_id.to_string(),
        mode,
        summary: summary.into(),
        findings,
        adapter_signals,
        reason_codes: Vec::new(),
    }
}

/// `capture`'s single-file path, for adapters that only apply to file inputs.
pub fn single_file_entry(capture: &weftend_capture::ArtifactCapture) -> Option<&str> {
    if capture.kind == weftend_capture::CaptureKind::File && capture.entries.len() == 1 {
        Some(capture.entries[0].path.as_str())
    } else {
        None
    }
}

#[must_use]
pub fn has_extension(path: &str, exts: &[&str]) -> bool {
    let Some(ext) = path.rsplit('.').next() else {
        return false;
    };
    let ext = ext.to_lowercase();
    exts.iter().any(|e| *e == ext)
}
