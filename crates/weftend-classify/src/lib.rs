//! Structural classifier (§4.3, §4.7).
//!
//! Given `(path, capture)`, assigns a stable `ArtifactKind` by walking a fixed,
//! ordered list of predicates: the first predicate that matches wins the
//! kind, but every predicate that was evaluated along the way contributes a
//! reason code, so the receipt carries a full account of the steps taken.
//! Grounded on the teacher's `xchecker-gate` policy evaluator, which walks an
//! ordered rule list and records which rules fired rather than computing a
//! single opaque score.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

/// The structural kind assigned to an artifact (§3 `ArtifactKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    ReleaseDir,
    NativeExe,
    NativeMsi,
    ShortcutLnk,
    Zip,
    Text,
    Unknown,
    /// Assigned downstream by the container adapter, never by the classifier
    /// itself; kept here so `contentSummary.adapterSignals.class` and
    /// `ArtifactKind` share one enum.
    ContainerImage,
}

impl ArtifactKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseDir => "RELEASE_DIR",
            Self::NativeExe => "NATIVE_EXE",
            Self::NativeMsi => "NATIVE_MSI",
            Self::ShortcutLnk => "SHORTCUT_LNK",
            Self::Zip => "ZIP",
            Self::Text => "TEXT",
            Self::Unknown => "UNKNOWN",
            Self::ContainerImage => "CONTAINER_IMAGE",
        }
    }

    /// Execution is withheld for every kind except the "other" catch-all
    /// (§4.5 execution gating table: NATIVE_*, SHORTCUT_LNK, ZIP, TEXT, UNKNOWN
    /// are all non-executable artifact kinds).
    #[must_use]
    pub const fn is_execution_eligible(self) -> bool {
        !matches!(
            self,
            Self::NativeExe | Self::NativeMsi | Self::ShortcutLnk | Self::Zip | Self::Text | Self::Unknown
        )
    }
}

/// The classifier's full output (§3, §4.3).
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub kind: ArtifactKind,
    pub entry_hint: Option<String>,
    pub reason_codes: Vec<String>,
}

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Classify `path`/`capture` into a stable `ArtifactKind` (§4.3).
///
/// `capture` comes from `weftend_capture::capture`; `path` is the original
/// filesystem input, re-read here for magic-byte inspection since capture
/// entries only carry digests, not bytes.
#[must_use]
pub fn classify(path: &Utf8Path, capture: &ArtifactCapture) -> ClassificationResult {
    let mut reason_codes = Vec::new();

    if capture.kind == weftend_capture::CaptureKind::Dir
        && has_root_entry(capture, "release_manifest.json")
        && has_root_entry(capture, "runtime_bundle.json")
    {
        reason_codes.push("CLASSIFY_RELEASE_DIR_MARKERS_PRESENT".to_string());
        return ClassificationResult {
            kind: ArtifactKind::ReleaseDir,
            entry_hint: None,
            reason_codes,
        };
    }
    reason_codes.push("CLASSIFY_RELEASE_DIR_MARKERS_ABSENT".to_string());

    let leaf_ext = leaf_extension(path, capture);
    let head = read_head(path, capture);

    let kind = if matches!(leaf_ext.as_deref(), Some("exe" | "dll" | "sys" | "drv")) {
        reason_codes.push("CLASSIFY_EXTENSION_NATIVE_EXE".to_string());
        ArtifactKind::NativeExe
    } else if leaf_ext.as_deref() == Some("msi") {
        reason_codes.push("CLASSIFY_EXTENSION_NATIVE_MSI".to_string());
        ArtifactKind::NativeMsi
    } else if leaf_ext.as_deref() == Some("lnk") {
        reason_codes.push("CLASSIFY_EXTENSION_SHORTCUT_LNK".to_string());
        ArtifactKind::ShortcutLnk
    } else if head.as_deref().is_some_and(|h| h.starts_with(ZIP_SIGNATURE)) {
        reason_codes.push("CLASSIFY_MAGIC_ZIP_SIGNATURE".to_string());
        ArtifactKind::Zip
    } else if head.as_deref().is_some_and(|h| looks_like_utf8_text(h)) {
        reason_codes.push("CLASSIFY_HEURISTIC_UTF8_TEXT".to_string());
        ArtifactKind::Text
    } else {
        reason_codes.push("CLASSIFY_NO_PREDICATE_MATCHED".to_string());
        ArtifactKind::Unknown
    };

    let entry_hint = root_html_entry(capture).map(|_| {
        reason_codes.push("CLASSIFY_ENTRY_HINT_HTML_LIKE".to_string());
        "ENTRY_HTML_LIKE".to_string()
    });

    ClassificationResult {
        kind,
        entry_hint,
        reason_codes,
    }
}

fn has_root_entry(capture: &ArtifactCapture, name: &str) -> bool {
    capture.entries.iter().any(|e| e.path == name)
}

fn root_html_entry(capture: &ArtifactCapture) -> Option<&str> {
    capture
        .entries
        .iter()
        .find(|e| !e.path.contains('/') && (e.path.ends_with(".html") || e.path.ends_with(".htm")))
        .map(|e| e.path.as_str())
}

fn leaf_extension(path: &Utf8Path, capture: &ArtifactCapture) -> Option<String> {
    let leaf = if capture.kind == weftend_capture::CaptureKind::File {
        path.file_name()?
    } else {
        return None;
    };
    Utf8Path::new(leaf)
        .extension()
        .map(|ext| ext.to_lowercase())
}

/// Read up to the first 4096 bytes of the original input for magic-byte and
/// text-heuristic inspection; classification never deep-parses (§4.3).
fn read_head(path: &Utf8Path, capture: &ArtifactCapture) -> Option<Vec<u8>> {
    use std::io::Read;
    if capture.kind != weftend_capture::CaptureKind::File {
        return None;
    }
    let mut file = std::fs::File::open(path.as_std_path()).ok()?;
    let mut buf = vec![0u8; 4096];
    let n = file.read(&mut buf).ok()?;
    buf.truncate(n);
    Some(buf)
}

fn looks_like_utf8_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.contains(&0) {
        return false;
    }
    std::str::from_utf8(bytes).is_ok()
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
    fn release_dir_requires_both_markers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("release_manifest.json"), b"{}").unwrap();
        fs::write(dir.path().join("runtime_bundle.json"), b"{}").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(dir.path()), &cap);
        assert_eq!(result.kind, ArtifactKind::ReleaseDir);
        assert!(result
            .reason_codes
            .contains(&"CLASSIFY_RELEASE_DIR_MARKERS_PRESENT".to_string()));
    }

    #[test]
    fn partial_release_markers_fall_through() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("release_manifest.json"), b"{}").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(dir.path()), &cap);
        assert_ne!(result.kind, ArtifactKind::ReleaseDir);
    }

    #[test]
    fn exe_extension_wins_over_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tool.exe");
        fs::write(&file, b"not a real PE").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(&file), &cap);
        assert_eq!(result.kind, ArtifactKind::NativeExe);
    }

    #[test]
    fn zip_signature_detected_without_extension() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob.bin");
        fs::write(&file, b"PK\x03\x04rest-of-archive").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(&file), &cap);
        assert_eq!(result.kind, ArtifactKind::Zip);
    }

    #[test]
    fn utf8_text_heuristic() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, b"hello world").unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(&file), &cap);
        assert_eq!(result.kind, ArtifactKind::Text);
    }

    #[test]
    fn binary_without_known_signature_is_unknown() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob.bin");
        fs::write(&file, [0u8, 1, 2, 3, 255, 254]).unwrap();
        let cap = capture(&utf8(&file), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(&file), &cap);
        assert_eq!(result.kind, ArtifactKind::Unknown);
    }

    #[test]
    fn entry_hint_flags_root_html() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let result = classify(&utf8(dir.path()), &cap);
        assert_eq!(result.entry_hint.as_deref(), Some("ENTRY_HTML_LIKE"));
    }
}
