//! Extension adapter (class `extension`, §4.4.d): browser/IDE extensions,
//! directory-packaged or CRX-wrapped ZIP.

use camino::Utf8Path;
use weftend_capture::{ArtifactCapture, CaptureKind};

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, reject_unsafe_names};
use crate::{Adapter, AdapterResult};

const MAX_EXTENSION_BYTES: u64 = 128 * 1024 * 1024;

pub struct ExtensionAdapter;

impl Adapter for ExtensionAdapter {
    fn id(&self) -> &'static str {
        "extension_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "extension"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        match capture.kind {
            CaptureKind::Dir => capture.entries.iter().any(|e| e.path == "manifest.json"),
            CaptureKind::File => capture
                .entries
                .first()
                .is_some_and(|e| e.path.to_lowercase().ends_with(".crx")),
            CaptureKind::Zip => false,
        }
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        match capture.kind {
            CaptureKind::Dir => validate_directory(path, capture, self.id()),
            CaptureKind::File => validate_crx(path, self.id()),
            CaptureKind::Zip => fail("EXTENSION_MANIFEST_MISSING", "zip-kind capture unsupported directly"),
        }
    }
}

fn validate_directory(path: &Utf8Path, capture: &ArtifactCapture, adapter_id: &str) -> AdapterResult {
    let manifest_entries: Vec<&str> = capture
        .entries
        .iter()
        .map(|e| e.path.as_str())
        .filter(|p| p.to_lowercase().ends_with("manifest.json"))
        .collect();

    if let Some(bad) = reject_unsafe_names(
        &manifest_entries.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "EXTENSION_FORMAT_MISMATCH",
    ) {
        return bad;
    }

    if !capture.entries.iter().any(|e| e.path == "manifest.json") {
        return fail("EXTENSION_MANIFEST_MISSING", "manifest.json not present at root");
    }

    let manifest_path = path.join("manifest.json");
    let bytes = match read_bounded(&manifest_path, MAX_EXTENSION_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("EXTENSION_MANIFEST_INVALID", e.to_string()),
    };
    validate_manifest_bytes(&bytes, adapter_id)
}

fn validate_crx(path: &Utf8Path, adapter_id: &str) -> AdapterResult {
    let bytes = match read_bounded(path, MAX_EXTENSION_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("EXTENSION_MANIFEST_INVALID", e.to_string()),
    };
    if bytes.len() < 16 || &bytes[0..4] != b"Cr24" {
        return fail("EXTENSION_MANIFEST_MISSING", "missing Cr24 CRX header magic");
    }
    let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let payload_start = 12 + header_len;
    if payload_start + 4 > bytes.len() || bytes[payload_start..payload_start + 4] != [0x50, 0x4b, 0x03, 0x04] {
        return fail("EXTENSION_MANIFEST_MISSING", "CRX payload is not a ZIP archive");
    }
    let payload = &bytes[payload_start..];
    let text = String::from_utf8_lossy(payload);
    if !text.contains("manifest.json") {
        return fail("EXTENSION_MANIFEST_MISSING", "CRX payload missing manifest.json");
    }
    ok(adapter_id, AdapterMode::Strict, "CRX-wrapped extension with manifest.json payload", Vec::new(), None)
}

fn validate_manifest_bytes(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => return fail("EXTENSION_MANIFEST_INVALID", format!("manifest.json parse error: {e}")),
    };
    let obj = match value.as_object() {
        Some(o) => o,
        None => return fail("EXTENSION_MANIFEST_INVALID", "manifest.json is not a JSON object"),
    };
    for field in ["manifest_version", "name", "version"] {
        if !obj.contains_key(field) {
            return fail("EXTENSION_MANIFEST_INVALID", format!("manifest.json missing required field {field}"));
        }
    }
    ok(adapter_id, AdapterMode::Strict, "manifest.json present with required fields", Vec::new(), None)
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

    #[test]
    fn accepts_well_formed_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            br#"{"manifest_version":3,"name":"demo","version":"1.0"}"#,
        )
        .unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = validate_directory(&utf8(dir.path()), &cap, "extension_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.json"), br#"{"name":"demo"}"#).unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = validate_directory(&utf8(dir.path()), &cap, "extension_adapter_v1");
        assert_eq!(result.fail_code(), Some("EXTENSION_MANIFEST_INVALID"));
    }

    #[test]
    fn rejects_missing_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("other.txt"), b"x").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = validate_directory(&utf8(dir.path()), &cap, "extension_adapter_v1");
        assert_eq!(result.fail_code(), Some("EXTENSION_MANIFEST_MISSING"));
    }
}
