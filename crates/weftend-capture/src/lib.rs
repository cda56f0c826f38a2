//! Bounded artifact capture (§4.2).
//!
//! Walks a file or directory into an ordered, digested entry list, the input
//! every classifier and adapter downstream operates on. Grounded on the
//! teacher's packet builder (`xchecker-packet`), which walks a bounded set of
//! candidate files under byte/line budgets and records per-file evidence; here
//! the budget is over raw capture bytes/file-count/path-length instead of
//! token budget, and the walk order is breadth-first-canonical rather than
//! priority-selected.

use std::collections::VecDeque;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use weftend_util::canon::{digest_bytes, digest_canonical};
use weftend_util::error::WeftEndError;
use weftend_util::paths::{is_contained, normalize_relative};

/// Capture limits (§4.2, §5 "bounded I/O").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureLimits {
    pub max_files: usize,
    pub max_total_bytes: u64,
    pub max_file_bytes: u64,
    pub max_path_bytes: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_files: 20_000,
            max_total_bytes: 512 * 1024 * 1024,
            max_file_bytes: 64 * 1024 * 1024,
            max_path_bytes: 4096,
        }
    }
}

/// Capture kind (§3 `ArtifactCapture.kind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    File,
    Dir,
    Zip,
}

/// A single captured file (§3 `ArtifactCapture.entries[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub path: String,
    pub bytes: u64,
    pub digest: String,
}

/// The full bounded capture (§3 `ArtifactCapture`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCapture {
    pub kind: CaptureKind,
    pub base_path: String,
    pub entries: Vec<CaptureEntry>,
    pub root_digest: String,
    pub limits: CaptureLimits,
    pub truncated: bool,
}

#[derive(serde::Serialize)]
struct RootDigestInput<'a> {
    entries: &'a [CaptureEntry],
}

impl ArtifactCapture {
    /// Total bytes across all captured entries.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.bytes).sum()
    }

    fn finish(
        kind: CaptureKind,
        base_path: &Utf8Path,
        mut entries: Vec<CaptureEntry>,
        limits: CaptureLimits,
        truncated: bool,
    ) -> Result<Self, WeftEndError> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        for window in entries.windows(2) {
            if window[0].path.to_lowercase() == window[1].path.to_lowercase() {
                return Err(WeftEndError::input(
                    "CAPTURE_CASE_COLLISION",
                    format!(
                        "entries collide under case-folding: {} / {}",
                        window[0].path, window[1].path
                    ),
                ));
            }
        }
        let root_digest = digest_canonical(&RootDigestInput { entries: &entries })
            .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
        Ok(Self {
            kind,
            base_path: base_path.to_string(),
            entries,
            root_digest,
            limits,
            truncated,
        })
    }
}

/// Capture `path` (a file or directory) under `limits` (§4.2).
pub fn capture(path: &Utf8Path, limits: CaptureLimits) -> Result<ArtifactCapture, WeftEndError> {
    if !path.exists() {
        return Err(WeftEndError::input(
            "INPUT_MISSING",
            format!("input path does not exist: {path}"),
        ));
    }

    let metadata = std::fs::symlink_metadata(path.as_std_path())
        .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;

    if metadata.is_file() {
        return capture_file(path, limits);
    }
    if metadata.is_dir() {
        return capture_dir(path, limits);
    }
    Err(WeftEndError::input(
        "INPUT_INVALID",
        format!("input path is neither a regular file nor a directory: {path}"),
    ))
}

fn capture_file(path: &Utf8Path, limits: CaptureLimits) -> Result<ArtifactCapture, WeftEndError> {
    let bytes = std::fs::read(path.as_std_path())
        .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
    if bytes.len() as u64 > limits.max_file_bytes {
        return Err(WeftEndError::input(
            "CAPTURE_MAX_FILE_BYTES_EXCEEDED",
            format!("file exceeds max_file_bytes: {path}"),
        ));
    }
    let leaf = path.file_name().unwrap_or("artifact").to_string();
    if leaf.len() > limits.max_path_bytes {
        return Err(WeftEndError::input(
            "CAPTURE_MAX_PATH_BYTES_EXCEEDED",
            format!("path exceeds max_path_bytes: {leaf}"),
        ));
    }
    let entry = CaptureEntry {
        path: leaf,
        bytes: bytes.len() as u64,
        digest: digest_bytes(&bytes),
    };
    ArtifactCapture::finish(CaptureKind::File, path, vec![entry], limits, false)
}

/// One pending directory to visit in the breadth-first walk.
struct PendingDir {
    abs: Utf8PathBuf,
    rel: Utf8PathBuf,
}

fn capture_dir(root: &Utf8Path, limits: CaptureLimits) -> Result<ArtifactCapture, WeftEndError> {
    let mut entries = Vec::new();
    let mut total_bytes: u64 = 0;
    let mut queue: VecDeque<PendingDir> = VecDeque::new();
    queue.push_back(PendingDir {
        abs: root.to_path_buf(),
        rel: Utf8PathBuf::new(),
    });

    let mut truncated = false;

    'walk: while let Some(dir) = queue.pop_front() {
        let mut children: Vec<std::fs::DirEntry> = std::fs::read_dir(dir.abs.as_std_path())
            .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
        children.sort_by_key(|e| e.file_name());

        for child in children {
            let child_name = child.file_name();
            let child_name = child_name.to_string_lossy().to_string();
            let child_abs = Utf8PathBuf::from_path_buf(child.path())
                .map_err(|_| WeftEndError::input("INPUT_INVALID", "non-UTF-8 path"))?;
            let child_rel = dir.rel.join(&child_name);

            let Some(normalized_rel) = normalize_relative(&child_rel) else {
                return Err(WeftEndError::input(
                    "CAPTURE_PATH_ESCAPES_ROOT",
                    format!("entry path escapes root: {child_rel}"),
                ));
            };

            if normalized_rel.as_str().len() > limits.max_path_bytes {
                truncated = true;
                break 'walk;
            }

            let symlink_meta = child
                .metadata()
                .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;

            if symlink_meta.is_symlink() {
                let target = std::fs::canonicalize(child_abs.as_std_path())
                    .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
                let target = Utf8PathBuf::from_path_buf(target)
                    .map_err(|_| WeftEndError::input("INPUT_INVALID", "non-UTF-8 symlink target"))?;
                if !is_contained(root, &target) {
                    return Err(WeftEndError::input(
                        "CAPTURE_SYMLINK_ESCAPES_ROOT",
                        format!("symlink target outside capture root: {child_abs}"),
                    ));
                }
                if target.as_path().is_dir() {
                    queue.push_back(PendingDir {
                        abs: target,
                        rel: normalized_rel,
                    });
                    continue;
                }
                // Falls through to file handling below using the resolved target.
                let file_bytes = std::fs::metadata(target.as_std_path())
                    .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?
                    .len();
                if file_bytes > limits.max_file_bytes {
                    truncated = true;
                    break 'walk;
                }
                if entries.len() >= limits.max_files {
                    truncated = true;
                    break 'walk;
                }
                let bytes = std::fs::read(target.as_std_path())
                    .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
                total_bytes += bytes.len() as u64;
                if total_bytes > limits.max_total_bytes {
                    truncated = true;
                    break 'walk;
                }
                entries.push(CaptureEntry {
                    path: normalized_rel.to_string(),
                    bytes: bytes.len() as u64,
                    digest: digest_bytes(&bytes),
                });
                continue;
            }

            if symlink_meta.is_dir() {
                queue.push_back(PendingDir {
                    abs: child_abs,
                    rel: normalized_rel,
                });
                continue;
            }

            if symlink_meta.len() > limits.max_file_bytes {
                truncated = true;
                break 'walk;
            }
            if entries.len() >= limits.max_files {
                truncated = true;
                break 'walk;
            }
            let bytes = std::fs::read(child_abs.as_std_path())
                .map_err(|e| WeftEndError::input("INPUT_INVALID", e.to_string()))?;
            total_bytes += bytes.len() as u64;
            if total_bytes > limits.max_total_bytes {
                truncated = true;
                break 'walk;
            }
            entries.push(CaptureEntry {
                path: normalized_rel.to_string(),
                bytes: bytes.len() as u64,
                digest: digest_bytes(&bytes),
            });
        }
    }

    ArtifactCapture::finish(CaptureKind::Dir, root, entries, limits, truncated)
}
