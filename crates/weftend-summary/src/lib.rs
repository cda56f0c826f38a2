//! Content summary builder (§4.6): derives a deterministic `ContentSummary`
//! from a capture, the classifier result, and the mint's observation set.

use camino::Utf8Path;
use once_cell::sync::Lazy;
use regex::Regex;
use weftend_capture::ArtifactCapture;
use weftend_classify::ArtifactKind;
use weftend_mint::MintPackage;
use weftend_receipt::{
    AdapterSignals, ContentSummary, ExternalRefs, FileCountsByKind, HashFamily, PolicyMatch,
    StringsIndicators,
};
use weftend_util::canon::sort_unique_bounded;

const MAX_FILE_BYTES_FOR_STRINGS: u64 = 1024 * 1024;
const TOP_EXTENSIONS_LIMIT: usize = 20;
const TOP_DOMAINS_LIMIT: usize = 10;

static URL_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\x22\x27]+").unwrap());
static IP_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());
static POWERSHELL_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)powershell(\.exe)?\s+-").unwrap());
static CMD_EXEC_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(cmd\.exe|/bin/sh|/bin/bash)\b").unwrap());

fn extension_bucket(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "html" | "htm" => "html",
        "js" | "mjs" | "cjs" => "js",
        "css" => "css",
        "json" => "json",
        "wasm" => "wasm",
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "mp3" | "mp4" | "avi" => "media",
        "exe" | "dll" | "so" | "msi" | "bin" | "a" | "o" | "sys" | "drv" => "binary",
        _ => "other",
    }
}

/// Build a deterministic `ContentSummary` (§4.6). `root_path` is the
/// original filesystem input, used to re-read text-file content for the
/// `stringsIndicators` bounded scan; capture entries carry digests only.
pub fn build_content_summary(
    root_path: &Utf8Path,
    target_kind: &str,
    artifact_kind: ArtifactKind,
    capture: &ArtifactCapture,
    mint: &MintPackage,
    policy_match: PolicyMatch,
    adapter_signals: Option<AdapterSignals>,
) -> ContentSummary {
    let mut counts = FileCountsByKind::default();
    let mut extensions = Vec::new();
    let mut manifest_count = 0u32;

    for entry in &capture.entries {
        match extension_bucket(&entry.path) {
            "html" => counts.html += 1,
            "js" => counts.js += 1,
            "css" => counts.css += 1,
            "json" => counts.json += 1,
            "wasm" => counts.wasm += 1,
            "media" => counts.media += 1,
            "binary" => counts.binary += 1,
            _ => counts.other += 1,
        }
        if let Some(ext) = entry.path.rsplit('.').next() {
            extensions.push(ext.to_lowercase());
        }
        let leaf = entry.path.rsplit('/').next().unwrap_or(&entry.path);
        if leaf.to_lowercase().contains("manifest") {
            manifest_count += 1;
        }
    }

    let top_extensions = sort_unique_bounded(extensions, TOP_EXTENSIONS_LIMIT);

    let mut entry_hints: Vec<String> = mint
        .observations
        .iter()
        .filter(|o| o.kind == "STRUCTURAL_MARKER")
        .map(|o| o.detail.clone())
        .collect();
    if artifact_kind == ArtifactKind::ContainerImage {
        entry_hints.push("ENTRY_CONTAINER_IMAGE".to_string());
    }
    let entry_hints = sort_unique_bounded(entry_hints, 64);

    let mut boundedness_markers = Vec::new();
    if capture.truncated {
        boundedness_markers.push("BOUND_CAPTURE_CAPPED".to_string());
    }
    let boundedness_markers = sort_unique_bounded(boundedness_markers, 64);

    let external_ref_domains: Vec<String> = mint
        .observations
        .iter()
        .filter(|o| o.kind == "EXTERNAL_REF")
        .map(|o| o.detail.clone())
        .collect();
    let external_ref_count = external_ref_domains.len() as u64;
    let external_refs = ExternalRefs {
        count: external_ref_count,
        top_domains: sort_unique_bounded(external_ref_domains, TOP_DOMAINS_LIMIT),
    };

    let has_scripts = counts.js > 0
        || mint.observations.iter().any(|o| o.kind == "SCRIPT_LIKE");
    let has_native_binaries = counts.binary > 0;
    let has_html = counts.html > 0;

    let strings_indicators = scan_strings_indicators(root_path, capture);

    ContentSummary {
        target_kind: target_kind.to_string(),
        artifact_kind: artifact_kind.as_str().to_string(),
        file_counts_by_kind: counts,
        total_files: capture.entries.len() as u64,
        total_bytes_bounded: capture.total_bytes(),
        top_extensions,
        has_native_binaries,
        has_scripts,
        has_html,
        external_refs,
        entry_hints,
        boundedness_markers,
        archive_depth_max: 0,
        nested_archive_count: 0,
        manifest_count,
        strings_indicators,
        adapter_signals,
        policy_match,
        hash_family: HashFamily {
            sha256: capture.root_digest.clone(),
        },
    }
}

fn scan_strings_indicators(root_path: &Utf8Path, capture: &ArtifactCapture) -> StringsIndicators {
    let mut indicators = StringsIndicators::default();

    for entry in &capture.entries {
        if extension_bucket(&entry.path) == "binary" {
            continue;
        }
        if entry.bytes > MAX_FILE_BYTES_FOR_STRINGS {
            continue;
        }
        let full_path = if capture.kind == weftend_capture::CaptureKind::File {
            root_path.to_path_buf()
        } else {
            root_path.join(&entry.path)
        };
        let Ok(bytes) = std::fs::read(full_path.as_std_path()) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        indicators.url_like_count += URL_LIKE.find_iter(&content).count() as u64;
        indicators.ip_like_count += IP_LIKE.find_iter(&content).count() as u64;
        indicators.powershell_like_count += POWERSHELL_LIKE.find_iter(&content).count() as u64;
        indicators.cmd_exec_like_count += CMD_EXEC_LIKE.find_iter(&content).count() as u64;
    }

    indicators
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_capture::{capture, CaptureLimits};
    use weftend_classify::classify;
    use weftend_mint::{ArtifactExaminer, LocalExaminer};

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn counts_files_by_extension_bucket() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        fs::write(dir.path().join("app.js"), b"console.log(1)").unwrap();
        fs::write(dir.path().join("data.json"), b"{}").unwrap();

        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let classification = classify(&utf8(dir.path()), &cap);
        let examiner = LocalExaminer::default();
        let outcome = examiner.examine_artifact(&utf8(dir.path()), None).unwrap();

        let summary = build_content_summary(
            &utf8(dir.path()),
            "dir",
            classification.kind,
            &cap,
            &outcome.mint,
            Default::default(),
            None,
        );
        assert_eq!(summary.file_counts_by_kind.html, 1);
        assert_eq!(summary.file_counts_by_kind.js, 1);
        assert_eq!(summary.file_counts_by_kind.json, 1);
        assert_eq!(summary.total_files, 3);
    }

    #[test]
    fn detects_url_like_strings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("notes.txt"),
            b"fetch from https://example.com/data and nothing else",
        )
        .unwrap();
        let cap = capture(&utf8(dir.path()), CaptureLimits::default()).unwrap();
        let classification = classify(&utf8(dir.path()), &cap);
        let examiner = LocalExaminer::default();
        let outcome = examiner.examine_artifact(&utf8(dir.path()), None).unwrap();

        let summary = build_content_summary(
            &utf8(dir.path()),
            "dir",
            classification.kind,
            &cap,
            &outcome.mint,
            Default::default(),
            None,
        );
        assert_eq!(summary.strings_indicators.url_like_count, 1);
    }
}
