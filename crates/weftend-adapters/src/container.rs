//! Container adapter (class `container`, §4.4.f): OCI image layout,
//! docker-save tar, compose YAML, SBOM JSON.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use camino::Utf8Path;
use weftend_capture::{ArtifactCapture, CaptureKind};

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, reject_unsafe_names, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_CONTAINER_METADATA_BYTES: u64 = 8 * 1024 * 1024;
const TAR_BLOCK_SIZE: u64 = 512;

pub struct ContainerAdapter;

impl Adapter for ContainerAdapter {
    fn id(&self) -> &'static str {
        "container_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "container"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        match capture.kind {
            CaptureKind::Dir => capture.entries.iter().any(|e| e.path == "oci-layout"),
            CaptureKind::File => single_file_entry(capture).is_some_and(|leaf| {
                let lower = leaf.to_lowercase();
                lower.ends_with(".yaml")
                    || lower.ends_with(".yml")
                    || lower.ends_with(".sbom.json")
                    || lower.ends_with(".tar")
            }),
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
            CaptureKind::Dir => validate_oci_layout(path, capture, self.id()),
            CaptureKind::File => {
                let Some(leaf) = single_file_entry(capture) else {
                    return fail("CONTAINER_FORMAT_MISMATCH", "container adapter requires a single file input");
                };
                let lower = leaf.to_lowercase();
                if lower.ends_with(".tar") {
                    return validate_docker_save_tar(path, self.id());
                }
                let bytes = match read_bounded(path, MAX_CONTAINER_METADATA_BYTES) {
                    Ok(b) => b,
                    Err(e) => return fail("CONTAINER_FORMAT_MISMATCH", e.to_string()),
                };
                if lower.ends_with(".sbom.json") {
                    validate_sbom(&bytes, self.id())
                } else {
                    validate_compose(&bytes, self.id())
                }
            }
            CaptureKind::Zip => fail("CONTAINER_FORMAT_MISMATCH", "zip-kind capture unsupported directly"),
        }
    }
}

fn validate_oci_layout(path: &Utf8Path, capture: &ArtifactCapture, adapter_id: &str) -> AdapterResult {
    if capture.entries.iter().filter(|e| e.path == "oci-layout").count() != 1 {
        return fail("CONTAINER_LAYOUT_INVALID", "duplicate or missing oci-layout root marker");
    }
    if !capture.entries.iter().any(|e| e.path == "index.json") {
        return fail("CONTAINER_LAYOUT_INVALID", "missing index.json at root");
    }

    let index_path = path.join("index.json");
    let bytes = match read_bounded(&index_path, MAX_CONTAINER_METADATA_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("CONTAINER_LAYOUT_INVALID", e.to_string()),
    };
    let index: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return fail("CONTAINER_LAYOUT_INVALID", format!("index.json parse error: {e}")),
    };
    let manifests = index
        .get("manifests")
        .and_then(|m| m.as_array())
        .cloned()
        .unwrap_or_default();

    let mut referenced_blobs = Vec::new();
    for manifest in &manifests {
        let Some(digest) = manifest.get("digest").and_then(|d| d.as_str()) else {
            continue;
        };
        let Some((algo, hex)) = digest.split_once(':') else {
            return fail("CONTAINER_LAYOUT_INVALID", format!("malformed digest reference: {digest}"));
        };
        let blob_rel = format!("blobs/{algo}/{hex}");
        if referenced_blobs.contains(&blob_rel) {
            return fail("CONTAINER_LAYOUT_INVALID", format!("duplicate blob reference path: {blob_rel}"));
        }
        if !capture.entries.iter().any(|e| e.path == blob_rel) {
            return fail("CONTAINER_LAYOUT_INVALID", format!("referenced blob missing: {blob_rel}"));
        }
        referenced_blobs.push(blob_rel);
    }

    ok(
        adapter_id,
        AdapterMode::Strict,
        format!("OCI layout with {} manifest entries and all blobs resolved", manifests.len()),
        referenced_blobs,
        None,
    )
}

fn validate_compose(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    let text = String::from_utf8_lossy(bytes);
    let document: serde_yaml::Value = match serde_yaml::from_str(&text) {
        Ok(v) => v,
        Err(e) => return fail("CONTAINER_FORMAT_MISMATCH", format!("compose YAML parse error: {e}")),
    };
    let Some(services) = document.get("services").and_then(|s| s.as_mapping()) else {
        return fail("CONTAINER_FORMAT_MISMATCH", "missing top-level services: map");
    };
    let found_service_hint = services.values().any(|service| {
        service
            .as_mapping()
            .is_some_and(|m| m.contains_key("image") || m.contains_key("build"))
    });
    if !found_service_hint {
        return fail("CONTAINER_FORMAT_MISMATCH", "no service carries an image: or build: hint");
    }
    ok(adapter_id, AdapterMode::Strict, "compose YAML with at least one service image/build hint", Vec::new(), None)
}

/// A single archive member's name and the location of its content.
struct TarEntry {
    name: String,
    data_offset: u64,
    size: u64,
}

/// Walk a tar archive's header blocks, recording each entry's name and the
/// offset/size of its data without reading file content into memory.
fn scan_tar_entries(path: &Utf8Path) -> std::io::Result<Vec<TarEntry>> {
    let mut file = File::open(path)?;
    let mut entries = Vec::new();
    let mut header = [0u8; TAR_BLOCK_SIZE as usize];
    loop {
        let read = read_fully_or_eof(&mut file, &mut header)?;
        if read < header.len() || header.iter().all(|&b| b == 0) {
            break;
        }
        let name = tar_field_str(&header[0..100]);
        if name.is_empty() {
            break;
        }
        let size = tar_octal(&header[124..136]);
        let data_offset = file.stream_position()?;
        entries.push(TarEntry { name, data_offset, size });
        let padded = size.div_ceil(TAR_BLOCK_SIZE) * TAR_BLOCK_SIZE;
        file.seek(SeekFrom::Current(padded as i64))?;
    }
    Ok(entries)
}

fn read_fully_or_eof(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn tar_field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn tar_octal(field: &[u8]) -> u64 {
    let text = String::from_utf8_lossy(field);
    let trimmed = text.trim_matches(|c: char| c == '\0' || c == ' ');
    u64::from_str_radix(trimmed, 8).unwrap_or(0)
}

fn read_tar_entry_bytes(path: &Utf8Path, entry: &TarEntry, max_bytes: u64) -> std::io::Result<Vec<u8>> {
    if entry.size > max_bytes {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "entry exceeds metadata bound"));
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(entry.data_offset))?;
    let mut buf = vec![0u8; entry.size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn is_unsafe_archive_path(p: &str) -> bool {
    p.starts_with('/') || p.split('/').any(|seg| seg == "..")
}

/// Docker-save tar contract (§4.4.f): `manifest.json` plus `repositories`
/// plus one or more `layer.tar` entries; every `Config` and `Layers[i]` in
/// `manifest.json` must resolve to an in-archive entry, with no duplicate,
/// nested/path-traversing, case-colliding, or empty `Layers` list.
fn validate_docker_save_tar(path: &Utf8Path, adapter_id: &str) -> AdapterResult {
    let entries = match scan_tar_entries(path) {
        Ok(e) => e,
        Err(e) => return fail("CONTAINER_FORMAT_MISMATCH", format!("unreadable tar archive: {e}")),
    };

    let entry_name_list: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    if let Some(failure) = reject_unsafe_names(&entry_name_list, "CONTAINER_FORMAT_MISMATCH") {
        return failure;
    }

    let manifest_entries: Vec<&TarEntry> = entries.iter().filter(|e| e.name == "manifest.json").collect();
    if manifest_entries.len() != 1 {
        return fail("CONTAINER_FORMAT_MISMATCH", "docker-save tar must contain exactly one manifest.json");
    }
    if !entries.iter().any(|e| e.name == "repositories") {
        return fail("CONTAINER_FORMAT_MISMATCH", "docker-save tar missing repositories file");
    }
    if !entries.iter().any(|e| e.name.ends_with("layer.tar")) {
        return fail("CONTAINER_FORMAT_MISMATCH", "docker-save tar has no layer.tar entries");
    }

    let manifest_bytes = match read_tar_entry_bytes(path, manifest_entries[0], MAX_CONTAINER_METADATA_BYTES) {
        Ok(b) => b,
        Err(e) => return fail("CONTAINER_FORMAT_MISMATCH", format!("unreadable manifest.json: {e}")),
    };
    let manifest: Vec<serde_json::Value> = match serde_json::from_slice(&manifest_bytes) {
        Ok(v) => v,
        Err(e) => return fail("CONTAINER_FORMAT_MISMATCH", format!("manifest.json parse error: {e}")),
    };

    let entry_names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    let mut resolved_refs = Vec::new();
    for image in &manifest {
        let Some(config) = image.get("Config").and_then(|c| c.as_str()) else {
            return fail("CONTAINER_FORMAT_MISMATCH", "manifest.json entry missing Config");
        };
        if is_unsafe_archive_path(config) || !entry_names.contains(config) {
            return fail("CONTAINER_FORMAT_MISMATCH", format!("Config not found in archive: {config}"));
        }
        let Some(layers) = image.get("Layers").and_then(|l| l.as_array()) else {
            return fail("CONTAINER_FORMAT_MISMATCH", "manifest.json entry missing Layers");
        };
        if layers.is_empty() {
            return fail("CONTAINER_FORMAT_MISMATCH", "manifest.json entry has empty Layers list");
        }
        let mut layer_paths = Vec::with_capacity(layers.len());
        for layer in layers {
            let Some(layer_path) = layer.as_str() else {
                return fail("CONTAINER_FORMAT_MISMATCH", "Layers entry is not a string");
            };
            layer_paths.push(layer_path.to_string());
        }
        if let Some(failure) = reject_unsafe_names(&layer_paths, "CONTAINER_FORMAT_MISMATCH") {
            return failure;
        }
        for layer_path in &layer_paths {
            if !entry_names.contains(layer_path.as_str()) {
                return fail("CONTAINER_FORMAT_MISMATCH", format!("referenced layer missing: {layer_path}"));
            }
        }
        resolved_refs.extend(layer_paths);
        resolved_refs.push(config.to_string());
    }
    resolved_refs.sort();
    resolved_refs.dedup();

    ok(
        adapter_id,
        AdapterMode::Strict,
        format!("docker-save tar with {} image manifest entries and all Config/Layers resolved", manifest.len()),
        resolved_refs,
        None,
    )
}

fn validate_sbom(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => return fail("CONTAINER_SBOM_INVALID", format!("SBOM JSON parse error: {e}")),
    };
    let components = value
        .get("components")
        .or_else(|| value.get("packages"))
        .and_then(|c| c.as_array());
    let Some(components) = components else {
        return fail("CONTAINER_SBOM_INVALID", "no components/packages list present");
    };
    let meaningful = components.iter().any(|c| {
        c.get("bom-ref").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty())
            || c.get("name").and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty())
    });
    if !meaningful {
        return fail("CONTAINER_SBOM_INVALID", "components/packages list has no meaningful entry");
    }
    ok(adapter_id, AdapterMode::Strict, format!("SBOM with {} component(s)", components.len()), Vec::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_compose_with_image_hint() {
        let yaml = "version: \"3\"\nservices:\n  web:\n    image: nginx:latest\n";
        let result = validate_compose(yaml.as_bytes(), "container_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_compose_without_services() {
        let yaml = "version: \"3\"\n";
        let result = validate_compose(yaml.as_bytes(), "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_sbom_with_empty_components() {
        let sbom = br#"{"components":[]}"#;
        let result = validate_sbom(sbom, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_SBOM_INVALID"));
    }

    #[test]
    fn accepts_sbom_with_named_component() {
        let sbom = br#"{"components":[{"name":"left-pad"}]}"#;
        let result = validate_sbom(sbom, "container_adapter_v1");
        assert!(result.is_ok());
    }

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in entries {
            let mut header = [0u8; 512];
            let name_bytes = name.as_bytes();
            header[0..name_bytes.len()].copy_from_slice(name_bytes);
            let size_field = format!("{:011o}\0", data.len());
            header[124..124 + size_field.len()].copy_from_slice(size_field.as_bytes());
            out.extend_from_slice(&header);
            out.extend_from_slice(data);
            let padding = (512 - (data.len() % 512)) % 512;
            out.resize(out.len() + padding, 0);
        }
        out.resize(out.len() + 1024, 0);
        out
    }

    fn write_tar(entries: &[(&str, &[u8])]) -> (tempfile::TempDir, camino::Utf8PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("image.tar")).unwrap();
        std::fs::write(&path, build_tar(entries)).unwrap();
        (dir, path)
    }

    fn valid_manifest() -> Vec<u8> {
        br#"[{"Config":"config123.json","RepoTags":["app:latest"],"Layers":["abc/layer.tar","def/layer.tar"]}]"#
            .to_vec()
    }

    #[test]
    fn accepts_valid_docker_save_tar() {
        let manifest = valid_manifest();
        let (_dir, path) = write_tar(&[
            ("manifest.json", &manifest),
            ("repositories", b"{}"),
            ("config123.json", b"{}"),
            ("abc/layer.tar", b"layer-a"),
            ("def/layer.tar", b"layer-b"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn rejects_tar_missing_repositories() {
        let manifest = valid_manifest();
        let (_dir, path) = write_tar(&[
            ("manifest.json", &manifest),
            ("config123.json", b"{}"),
            ("abc/layer.tar", b"layer-a"),
            ("def/layer.tar", b"layer-b"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_tar_with_unresolved_layer_reference() {
        let manifest = br#"[{"Config":"config123.json","Layers":["missing/layer.tar"]}]"#;
        let (_dir, path) = write_tar(&[
            ("manifest.json", manifest),
            ("repositories", b"{}"),
            ("config123.json", b"{}"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_tar_with_duplicate_layer_reference() {
        let manifest = br#"[{"Config":"config123.json","Layers":["abc/layer.tar","abc/layer.tar"]}]"#;
        let (_dir, path) = write_tar(&[
            ("manifest.json", manifest),
            ("repositories", b"{}"),
            ("config123.json", b"{}"),
            ("abc/layer.tar", b"layer-a"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_tar_with_empty_layers_list() {
        let manifest = br#"[{"Config":"config123.json","Layers":[]}]"#;
        let (_dir, path) = write_tar(&[
            ("manifest.json", manifest),
            ("repositories", b"{}"),
            ("config123.json", b"{}"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_tar_with_path_traversing_layer_reference() {
        let manifest = br#"[{"Config":"config123.json","Layers":["../etc/layer.tar"]}]"#;
        let (_dir, path) = write_tar(&[
            ("manifest.json", manifest),
            ("repositories", b"{}"),
            ("config123.json", b"{}"),
        ]);
        let result = validate_docker_save_tar(&path, "container_adapter_v1");
        assert_eq!(result.fail_code(), Some("CONTAINER_FORMAT_MISMATCH"));
    }
}
