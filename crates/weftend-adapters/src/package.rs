//! Package adapter (class `package`, §4.4.c): MSI, MSIX/NUPKG/JAR/WHL, DEB,
//! RPM, APPIMAGE, PKG, DMG.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_PACKAGE_BYTES: u64 = 512 * 1024 * 1024;
const CFB_MAGIC: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const RPM_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const AR_MAGIC: &[u8] = b"!<arch>\n";
const XAR_MAGIC: &[u8] = b"xar!";
const ZIP_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

pub struct PackageAdapter;

impl Adapter for PackageAdapter {
    fn id(&self) -> &'static str {
        "package_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "package"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        let Some(leaf) = single_file_entry(capture) else {
            return false;
        };
        let lower = leaf.to_lowercase();
        ["msi", "msix", "nupkg", "jar", "whl", "deb", "rpm", "appimage", "pkg", "dmg"]
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        enabled_plugins: &[String],
    ) -> AdapterResult {
        let Some(leaf) = single_file_entry(capture) else {
            return fail("PACKAGE_FORMAT_MISMATCH", "package adapter requires a single file input");
        };
        let lower = leaf.to_lowercase();

        if lower.ends_with(".tgz") {
            if !enabled_plugins.iter().any(|p| p == "tar") {
                return fail("PACKAGE_PLUGIN_REQUIRED", "tgz package requires the tar plugin");
            }
            return ok(self.id(), AdapterMode::Plugin, "tgz package accepted via tar plugin", Vec::new(), None);
        }

        let bytes = match read_bounded(path, MAX_PACKAGE_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("PACKAGE_FORMAT_MISMATCH", e.to_string()),
        };

        if lower.ends_with(".msi") {
            return validate_cfb(&bytes, self.id());
        }
        if lower.ends_with(".msix") {
            return validate_zip_based(&bytes, &["[Content_Types].xml", "AppxManifest.xml"], self.id(), "MSIX");
        }
        if lower.ends_with(".nupkg") {
            return validate_zip_based(&bytes, &["[Content_Types].xml"], self.id(), "NUPKG");
        }
        if lower.ends_with(".jar") {
            return validate_zip_based(&bytes, &[], self.id(), "JAR");
        }
        if lower.ends_with(".whl") {
            return validate_zip_based(&bytes, &[], self.id(), "WHL");
        }
        if lower.ends_with(".deb") {
            return validate_ar(&bytes, self.id());
        }
        if lower.ends_with(".rpm") {
            return validate_rpm(&bytes, self.id());
        }
        if lower.ends_with(".appimage") {
            return validate_appimage(&bytes, self.id());
        }
        if lower.ends_with(".pkg") {
            return validate_xar(&bytes, self.id());
        }
        if lower.ends_with(".dmg") {
            return validate_dmg(&bytes, self.id());
        }
        fail("PACKAGE_FORMAT_MISMATCH", "unrecognized package extension")
    }
}

const MIN_PACKAGE_SIZE: usize = 64;

fn validate_cfb(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 512 || !bytes.starts_with(&CFB_MAGIC) {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing CFB magic for MSI");
    }
    ok(adapter_id, AdapterMode::Strict, "MSI compound file with valid CFB magic", Vec::new(), None)
}

fn validate_zip_based(bytes: &[u8], required_root_markers: &[&str], adapter_id: &str, label: &str) -> AdapterResult {
    if bytes.len() < MIN_PACKAGE_SIZE || !bytes.starts_with(&ZIP_SIG) {
        return fail("PACKAGE_FORMAT_MISMATCH", format!("{label} missing ZIP local header magic"));
    }
    let text = String::from_utf8_lossy(bytes);
    for marker in required_root_markers {
        if !text.contains(marker) {
            return fail("PACKAGE_FORMAT_MISMATCH", format!("{label} missing required marker {marker}"));
        }
    }
    if label == "MSIX" && text.matches("AppxManifest.xml").count() > 1 {
        return fail("PACKAGE_FORMAT_MISMATCH", "ambiguous multiple MSIX root markers");
    }
    ok(adapter_id, AdapterMode::Strict, format!("{label} package with required markers present"), Vec::new(), None)
}

fn validate_ar(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < MIN_PACKAGE_SIZE || !bytes.starts_with(AR_MAGIC) {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing ar(1) magic for DEB");
    }
    ok(adapter_id, AdapterMode::Strict, "DEB ar archive with valid magic", Vec::new(), None)
}

fn validate_rpm(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 96 || !bytes.starts_with(&RPM_MAGIC) {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing RPM lead magic");
    }
    ok(adapter_id, AdapterMode::Strict, "RPM lead+header magic present", Vec::new(), None)
}

fn validate_appimage(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < MIN_PACKAGE_SIZE || &bytes[0..4] != b"\x7fELF" {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing ELF magic for AppImage");
    }
    let haystack = &bytes[..bytes.len().min(4096)];
    if !haystack.windows(9).any(|w| w == b"AppImage\0" || w == b"AppImage") {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing AppImage runtime magic");
    }
    ok(adapter_id, AdapterMode::Strict, "ELF AppImage runtime magic present", Vec::new(), None)
}

fn validate_xar(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < MIN_PACKAGE_SIZE || !bytes.starts_with(XAR_MAGIC) {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing xar magic for PKG");
    }
    ok(adapter_id, AdapterMode::Strict, "PKG xar magic present", Vec::new(), None)
}

fn validate_dmg(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 512 {
        return fail("PACKAGE_FORMAT_MISMATCH", "DMG below structural minimum size");
    }
    let tail = &bytes[bytes.len() - 512..];
    if !tail.windows(4).any(|w| w == b"koly") {
        return fail("PACKAGE_FORMAT_MISMATCH", "missing koly trailer for DMG");
    }
    ok(adapter_id, AdapterMode::Strict, "DMG koly trailer present", Vec::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_msi_without_cfb_magic() {
        let result = validate_cfb(b"not a compound file at all padding padding padding", "package_adapter_v1");
        assert_eq!(result.fail_code(), Some("PACKAGE_FORMAT_MISMATCH"));
    }

    #[test]
    fn accepts_msi_with_cfb_magic() {
        let mut bytes = CFB_MAGIC.to_vec();
        bytes.extend(std::iter::repeat(0u8).take(512));
        let result = validate_cfb(&bytes, "package_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_deb_without_ar_magic() {
        let result = validate_ar(&[0u8; 64], "package_adapter_v1");
        assert_eq!(result.fail_code(), Some("PACKAGE_FORMAT_MISMATCH"));
    }

    #[test]
    fn accepts_deb_with_ar_magic() {
        let mut bytes = AR_MAGIC.to_vec();
        bytes.extend(std::iter::repeat(0u8).take(64));
        let result = validate_ar(&bytes, "package_adapter_v1");
        assert!(result.is_ok());
    }
}
