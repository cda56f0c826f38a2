//! Image adapter (class `image`, §4.4.g): ISO9660, VHD, VHDX, QCOW2, VMDK.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_IMAGE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const SECTOR: usize = 2048;

pub struct ImageAdapter;

impl Adapter for ImageAdapter {
    fn id(&self) -> &'static str {
        "image_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "image"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        let Some(leaf) = single_file_entry(capture) else {
            return false;
        };
        let lower = leaf.to_lowercase();
        ["iso", "vhd", "vhdx", "qcow2", "vmdk"]
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        let Some(leaf) = single_file_entry(capture) else {
            return fail("IMAGE_FORMAT_MISMATCH", "image adapter requires a single file input");
        };
        let lower = leaf.to_lowercase();
        let bytes = match read_bounded(path, MAX_IMAGE_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("IMAGE_FORMAT_MISMATCH", e.to_string()),
        };

        if lower.ends_with(".iso") {
            return validate_iso9660(&bytes, self.id());
        }
        if lower.ends_with(".vhd") {
            return validate_vhd(&bytes, self.id());
        }
        if lower.ends_with(".vhdx") {
            return validate_vhdx(&bytes, self.id());
        }
        if lower.ends_with(".qcow2") {
            return validate_qcow2(&bytes, self.id());
        }
        validate_vmdk(&bytes, self.id())
    }
}

fn validate_iso9660(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 18 * SECTOR {
        return fail("IMAGE_FORMAT_MISMATCH", "file too small to contain a primary volume descriptor");
    }
    let pvd_offset = 16 * SECTOR;
    let pvd = &bytes[pvd_offset..pvd_offset + 7];
    if pvd[0] != 0x01 || &pvd[1..6] != b"CD001" || pvd[6] != 0x01 {
        return fail("IMAGE_FORMAT_MISMATCH", "missing primary volume descriptor at sector 16");
    }
    let term_offset = 17 * SECTOR;
    let term = &bytes[term_offset..term_offset + 7];
    if term[0] != 0xff || &term[1..6] != b"CD001" || term[6] != 0x01 {
        return fail("IMAGE_FORMAT_MISMATCH", "missing volume descriptor set terminator at sector 17");
    }
    ok(adapter_id, AdapterMode::Strict, "ISO9660 primary volume descriptor and terminator present", Vec::new(), None)
}

fn validate_vhd(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 512 {
        return fail("IMAGE_FORMAT_MISMATCH", "VHD below structural minimum size");
    }
    let footer = &bytes[bytes.len() - 512..];
    if &footer[0..8] != b"conectix" {
        return fail("IMAGE_FORMAT_MISMATCH", "missing conectix footer");
    }
    ok(adapter_id, AdapterMode::Strict, "VHD conectix footer present", Vec::new(), None)
}

fn validate_vhdx(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 1024 * 1024 || &bytes[0..8] != b"vhdxfile" {
        return fail("IMAGE_FORMAT_MISMATCH", "missing vhdxfile signature or below minimum size");
    }
    ok(adapter_id, AdapterMode::Strict, "VHDX signature present", Vec::new(), None)
}

fn validate_qcow2(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 72 || &bytes[0..4] != b"QFI\xfb" {
        return fail("IMAGE_FORMAT_MISMATCH", "missing QFI\\xfb magic");
    }
    let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != 2 && version != 3 {
        return fail("IMAGE_FORMAT_MISMATCH", format!("unsupported qcow2 version {version}"));
    }
    ok(adapter_id, AdapterMode::Strict, format!("QCOW2 magic with version {version}"), Vec::new(), None)
}

fn validate_vmdk(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() >= 4 && &bytes[0..4] == b"KDMV" {
        return ok(adapter_id, AdapterMode::Strict, "VMDK sparse extent header with valid magic", Vec::new(), None);
    }
    let text = String::from_utf8_lossy(bytes);
    let has_descriptor = text.contains("createType")
        && text.contains("# Disk DescriptorFile")
        && text.lines().any(|l| l.contains("RW") && l.contains("SPARSE"));
    if has_descriptor {
        return ok(adapter_id, AdapterMode::Strict, "VMDK descriptor file with at least one RW SPARSE extent", Vec::new(), None);
    }
    fail("IMAGE_FORMAT_MISMATCH", "neither sparse header magic nor a complete descriptor file found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_iso9660() {
        let mut bytes = vec![0u8; 19 * SECTOR];
        bytes[16 * SECTOR] = 0x01;
        bytes[16 * SECTOR + 1..16 * SECTOR + 6].copy_from_slice(b"CD001");
        bytes[16 * SECTOR + 6] = 0x01;
        bytes[17 * SECTOR] = 0xff;
        bytes[17 * SECTOR + 1..17 * SECTOR + 6].copy_from_slice(b"CD001");
        bytes[17 * SECTOR + 6] = 0x01;
        let result = validate_iso9660(&bytes, "image_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_iso9660_missing_terminator() {
        let mut bytes = vec![0u8; 19 * SECTOR];
        bytes[16 * SECTOR] = 0x01;
        bytes[16 * SECTOR + 1..16 * SECTOR + 6].copy_from_slice(b"CD001");
        bytes[16 * SECTOR + 6] = 0x01;
        let result = validate_iso9660(&bytes, "image_adapter_v1");
        assert_eq!(result.fail_code(), Some("IMAGE_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_vmdk_weak_hints_only() {
        let result = validate_vmdk(b"createType is some kind of sparse thing", "image_adapter_v1");
        assert_eq!(result.fail_code(), Some("IMAGE_FORMAT_MISMATCH"));
    }

    #[test]
    fn accepts_vmdk_descriptor_file() {
        let text = "# Disk DescriptorFile\ncreateType=\"monolithicSparse\"\nRW 100 SPARSE \"x.vmdk\"\n";
        let result = validate_vmdk(text.as_bytes(), "image_adapter_v1");
        assert!(result.is_ok());
    }
}
