//! Archive adapter (class `archive`, §4.4.b): ZIP native, TAR/TGZ via the
//! `tar` plugin.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::{AdapterMode, AdapterSignalsData};
use crate::shared::{fail, ok, read_bounded, reject_unsafe_names, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_ARCHIVE_BYTES: u64 = 256 * 1024 * 1024;
const EOCD_SIG: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const LOCAL_FILE_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

pub struct ArchiveAdapter;

impl Adapter for ArchiveAdapter {
    fn id(&self) -> &'static str {
        "archive_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "archive"
    }

    fn fitness(&self, path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        let Some(leaf) = single_file_entry(capture) else {
            return false;
        };
        let lower = leaf.to_lowercase();
        if lower.ends_with(".zip") || lower.ends_with(".tar") || lower.ends_with(".tgz") {
            return true;
        }
        matches!(read_bounded(path, 4096), Ok(head) if head.starts_with(&LOCAL_FILE_SIG))
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        enabled_plugins: &[String],
    ) -> AdapterResult {
        let Some(leaf) = single_file_entry(capture) else {
            return fail("ARCHIVE_FORMAT_MISMATCH", "archive adapter requires a single file input");
        };
        let lower = leaf.to_lowercase();

        if lower.ends_with(".tgz") || (lower.ends_with(".tar.gz")) {
            if !enabled_plugins.iter().any(|p| p == "tar") {
                return fail("ARCHIVE_PLUGIN_REQUIRED", "tgz input requires the tar plugin");
            }
            return ok(
                self.id(),
                AdapterMode::Plugin,
                "tgz accepted via tar plugin (content not re-validated locally)",
                vec!["tgz delegated to tar plugin".to_string()],
                None,
            );
        }
        if lower.ends_with(".tar") {
            return validate_tar(path);
        }
        validate_zip(path)
    }
}

fn validate_zip(path: &Utf8Path) -> AdapterResult {
    let bytes = match read_bounded(path, MAX_ARCHIVE_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("ARCHIVE_FORMAT_MISMATCH", e.to_string()),
    };
    if bytes.len() < 22 || !bytes.starts_with(&LOCAL_FILE_SIG) {
        return fail("ARCHIVE_FORMAT_MISMATCH", "missing ZIP local file header magic");
    }

    let Some(eocd_offset) = find_eocd(&bytes) else {
        return fail("ARCHIVE_FORMAT_MISMATCH", "end-of-central-directory record not found");
    };
    if eocd_offset + 22 > bytes.len() {
        return fail("ARCHIVE_FORMAT_MISMATCH", "truncated end-of-central-directory record");
    }
    let cd_entry_count = u16::from_le_bytes([bytes[eocd_offset + 10], bytes[eocd_offset + 11]]) as usize;
    let cd_size = u32::from_le_bytes([
        bytes[eocd_offset + 12],
        bytes[eocd_offset + 13],
        bytes[eocd_offset + 14],
        bytes[eocd_offset + 15],
    ]) as usize;
    let cd_offset = u32::from_le_bytes([
        bytes[eocd_offset + 16],
        bytes[eocd_offset + 17],
        bytes[eocd_offset + 18],
        bytes[eocd_offset + 19],
    ]) as usize;
    if cd_offset + cd_size > bytes.len() || cd_offset > eocd_offset {
        return fail("ARCHIVE_FORMAT_MISMATCH", "central directory declared length overflows file");
    }

    let mut names = Vec::with_capacity(cd_entry_count);
    let mut cursor = cd_offset;
    for _ in 0..cd_entry_count {
        if cursor + 46 > bytes.len() || bytes[cursor..cursor + 4] != CENTRAL_DIR_SIG {
            return fail(
                "ARCHIVE_FORMAT_MISMATCH",
                "central directory entry signature corrupt after parsing prior entries",
            );
        }
        let name_len = u16::from_le_bytes([bytes[cursor + 28], bytes[cursor + 29]]) as usize;
        let extra_len = u16::from_le_bytes([bytes[cursor + 30], bytes[cursor + 31]]) as usize;
        let comment_len = u16::from_le_bytes([bytes[cursor + 32], bytes[cursor + 33]]) as usize;
        let name_start = cursor + 46;
        let name_end = name_start + name_len;
        if name_end > bytes.len() {
            return fail("ARCHIVE_FORMAT_MISMATCH", "central directory entry name overruns file");
        }
        names.push(String::from_utf8_lossy(&bytes[name_start..name_end]).to_string());
        cursor = name_end + extra_len + comment_len;
    }

    if let Some(bad) = reject_unsafe_names(&names, "ARCHIVE_FORMAT_MISMATCH") {
        return bad;
    }

    let trailing = bytes.len() - (eocd_offset + 22);
    if trailing != 0 {
        return fail(
            "ARCHIVE_FORMAT_MISMATCH",
            "trailing bytes after end-of-central-directory record",
        );
    }

    let mut signals = serde_json::Map::new();
    signals.insert("entryCount".to_string(), serde_json::json!(names.len()));
    ok(
        "archive_adapter_v1",
        AdapterMode::Strict,
        format!("ZIP archive with {} entries", names.len()),
        names,
        Some(AdapterSignalsData {
            class: "archive".to_string(),
            extra: signals,
        }),
    )
}

fn find_eocd(bytes: &[u8]) -> Option<usize> {
    let search_start = bytes.len().saturating_sub(22 + 65536);
    bytes[search_start..]
        .windows(4)
        .rposition(|w| w == EOCD_SIG)
        .map(|p| search_start + p)
}

fn validate_tar(path: &Utf8Path) -> AdapterResult {
    let bytes = match read_bounded(path, MAX_ARCHIVE_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("ARCHIVE_FORMAT_MISMATCH", e.to_string()),
    };
    if bytes.len() < 1024 || bytes.len() % 512 != 0 {
        return fail("ARCHIVE_FORMAT_MISMATCH", "tar file is not block-aligned");
    }
    if &bytes[257..262] != b"ustar" {
        return fail("ARCHIVE_FORMAT_MISMATCH", "missing ustar magic in first header block");
    }
    if !header_checksum_valid(&bytes[0..512]) {
        return fail("ARCHIVE_FORMAT_MISMATCH", "ustar header checksum mismatch");
    }
    let tail = &bytes[bytes.len() - 1024..];
    if !tail.iter().all(|b| *b == 0) {
        return fail(
            "ARCHIVE_FORMAT_MISMATCH",
            "trailing two all-zero blocks missing or non-zero",
        );
    }
    ok(
        "archive_adapter_v1",
        AdapterMode::Strict,
        "tar archive with valid ustar header and zero-block trailer",
        Vec::new(),
        None,
    )
}

fn header_checksum_valid(block: &[u8]) -> bool {
    let Ok(declared_str) = std::str::from_utf8(&block[148..156]) else {
        return false;
    };
    let Ok(declared) = u32::from_str_radix(declared_str.trim_matches(|c| c == '\0' || c == ' '), 8) else {
        return false;
    };
    let mut sum: u32 = 0;
    for (i, b) in block.iter().enumerate() {
        sum += if (148..156).contains(&i) { b' ' as u32 } else { *b as u32 };
    }
    sum == declared
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn write_zip(dir: &TempDir, entries: &[(&str, &[u8])]) -> camino::Utf8PathBuf {
        let path = dir.path().join("a.zip");
        let mut file = std::fs::File::create(&path).unwrap();
        let mut central = Vec::new();
        let mut offset = 0u32;
        for (name, content) in entries {
            let local_start = offset;
            file.write_all(&LOCAL_FILE_SIG).unwrap();
            file.write_all(&[0u8; 2]).unwrap(); // version
            file.write_all(&[0u8; 2]).unwrap(); // flags
            file.write_all(&[0u8; 2]).unwrap(); // method (stored)
            file.write_all(&[0u8; 4]).unwrap(); // time+date
            file.write_all(&[0u8; 4]).unwrap(); // crc32
            file.write_all(&(content.len() as u32).to_le_bytes()).unwrap();
            file.write_all(&(content.len() as u32).to_le_bytes()).unwrap();
            file.write_all(&(name.len() as u16).to_le_bytes()).unwrap();
            file.write_all(&0u16.to_le_bytes()).unwrap();
            file.write_all(name.as_bytes()).unwrap();
            file.write_all(content).unwrap();
            offset += 30 + name.len() as u32 + content.len() as u32;

            central.extend_from_slice(&CENTRAL_DIR_SIG);
            central.extend_from_slice(&[0u8; 4]); // version made by + needed
            central.extend_from_slice(&[0u8; 2]); // flags
            central.extend_from_slice(&[0u8; 2]); // method
            central.extend_from_slice(&[0u8; 4]); // time+date
            central.extend_from_slice(&[0u8; 4]); // crc32
            central.extend_from_slice(&(content.len() as u32).to_le_bytes());
            central.extend_from_slice(&(content.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra len
            central.extend_from_slice(&0u16.to_le_bytes()); // comment len
            central.extend_from_slice(&0u16.to_le_bytes()); // disk number
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&local_start.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }
        let cd_offset = offset;
        file.write_all(&central).unwrap();
        let cd_size = central.len() as u32;
        file.write_all(&EOCD_SIG).unwrap();
        file.write_all(&0u16.to_le_bytes()).unwrap(); // disk number
        file.write_all(&0u16.to_le_bytes()).unwrap(); // cd start disk
        file.write_all(&(entries.len() as u16).to_le_bytes()).unwrap();
        file.write_all(&(entries.len() as u16).to_le_bytes()).unwrap();
        file.write_all(&cd_size.to_le_bytes()).unwrap();
        file.write_all(&cd_offset.to_le_bytes()).unwrap();
        file.write_all(&0u16.to_le_bytes()).unwrap(); // comment len
        utf8(&path)
    }

    #[test]
    fn accepts_well_formed_two_entry_zip() {
        let dir = TempDir::new().unwrap();
        let zip = write_zip(&dir, &[("a.txt", b"alpha"), ("b/c.txt", b"beta")]);
        let cap = weftend_capture::capture(&zip, weftend_capture::CaptureLimits::default()).unwrap();
        let result = validate_zip(&zip);
        assert!(result.is_ok());
        let _ = cap;
    }

    #[test]
    fn rejects_duplicate_entry_names() {
        let dir = TempDir::new().unwrap();
        let zip = write_zip(&dir, &[("a.txt", b"alpha"), ("a.txt", b"beta")]);
        let result = validate_zip(&zip);
        assert_eq!(result.fail_code(), Some("ARCHIVE_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_case_colliding_entry_names() {
        let dir = TempDir::new().unwrap();
        let zip = write_zip(&dir, &[("a.txt", b"alpha"), ("A.TXT", b"beta")]);
        let result = validate_zip(&zip);
        assert_eq!(result.fail_code(), Some("ARCHIVE_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_missing_eocd() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, &LOCAL_FILE_SIG).unwrap();
        let result = validate_zip(&utf8(&path));
        assert_eq!(result.fail_code(), Some("ARCHIVE_FORMAT_MISMATCH"));
    }

    #[test]
    fn tgz_without_plugin_requires_plugin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tgz");
        std::fs::write(&path, b"not really gzip, just a placeholder").unwrap();
        let adapter = ArchiveAdapter;
        let cap = weftend_capture::capture(&utf8(&path), weftend_capture::CaptureLimits::default()).unwrap();
        let result = adapter.validate(&utf8(&path), &cap, &[]);
        assert_eq!(result.fail_code(), Some("ARCHIVE_PLUGIN_REQUIRED"));
    }
}
