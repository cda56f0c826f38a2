//! Document adapter (class `document`, §4.4.e): PDF, RTF, CHM, OOXML.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_DOCUMENT_BYTES: u64 = 128 * 1024 * 1024;
const ZIP_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

pub struct DocumentAdapter;

impl Adapter for DocumentAdapter {
    fn id(&self) -> &'static str {
        "document_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "document"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        let Some(leaf) = single_file_entry(capture) else {
            return false;
        };
        let lower = leaf.to_lowercase();
        ["pdf", "rtf", "chm", "docm", "xlsm", "pptm"]
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
            return fail("DOC_FORMAT_MISMATCH", "document adapter requires a single file input");
        };
        let lower = leaf.to_lowercase();
        let bytes = match read_bounded(path, MAX_DOCUMENT_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("DOC_FORMAT_MISMATCH", e.to_string()),
        };

        if lower.ends_with(".pdf") {
            return validate_pdf(&bytes, self.id());
        }
        if lower.ends_with(".rtf") {
            return validate_rtf(&bytes, self.id());
        }
        if lower.ends_with(".chm") {
            return validate_chm(&bytes, self.id());
        }
        validate_ooxml(&bytes, &lower, self.id())
    }
}

fn validate_pdf(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if !bytes.starts_with(b"%PDF-") {
        return fail("DOC_FORMAT_MISMATCH", "missing %PDF- magic");
    }
    let text = String::from_utf8_lossy(bytes);
    let has_obj_pair = text.contains(" obj") && text.contains("endobj");
    if !has_obj_pair {
        return fail("DOC_FORMAT_MISMATCH", "no N M obj/endobj pair found");
    }
    if !text.contains("startxref") {
        return fail("DOC_FORMAT_MISMATCH", "missing startxref");
    }
    let tail_start = bytes.len().saturating_sub(1024);
    let tail = String::from_utf8_lossy(&bytes[tail_start..]);
    if !tail.contains("%%EOF") {
        return fail("DOC_FORMAT_MISMATCH", "missing %%EOF trailer in last kilobyte");
    }
    ok(adapter_id, AdapterMode::Strict, "PDF with obj/endobj, startxref, and %%EOF trailer", Vec::new(), None)
}

fn validate_rtf(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    let text = String::from_utf8_lossy(bytes);
    if !text.starts_with("{\\rtf1") {
        return fail("DOC_FORMAT_MISMATCH", "missing {\\rtf1 prolog");
    }
    if !text[6..].contains('\\') {
        return fail("DOC_FORMAT_MISMATCH", "no additional control word after prolog");
    }
    let opens = text.matches('{').count();
    let closes = text.matches('}').count();
    if opens != closes || opens == 0 {
        return fail("DOC_FORMAT_MISMATCH", "unbalanced RTF braces");
    }
    ok(adapter_id, AdapterMode::Strict, "RTF prolog with balanced control groups", Vec::new(), None)
}

fn validate_chm(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 56 || &bytes[0..4] != b"ITSF" {
        return fail("DOC_FORMAT_MISMATCH", "missing ITSF signature");
    }
    let header_len = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]) as usize;
    if header_len < 56 || bytes.len() < header_len {
        return fail("DOC_FORMAT_MISMATCH", "CHM header length insufficient");
    }
    ok(adapter_id, AdapterMode::Strict, "CHM ITSF signature with sufficient header", Vec::new(), None)
}

fn validate_ooxml(bytes: &[u8], lower: &str, adapter_id: &str) -> AdapterResult {
    if !bytes.starts_with(&ZIP_SIG) {
        return fail("DOC_FORMAT_MISMATCH", "OOXML container missing ZIP local header magic");
    }
    let text = String::from_utf8_lossy(bytes);
    if text.matches("[Content_Types].xml").count() != 1 {
        return fail("DOC_FORMAT_MISMATCH", "missing or duplicate [Content_Types].xml");
    }
    if !text.contains("_rels/.rels") {
        return fail("DOC_FORMAT_MISMATCH", "missing _rels/.rels");
    }
    let primary_part = if lower.ends_with(".docm") {
        "word/document.xml"
    } else if lower.ends_with(".xlsm") {
        "xl/workbook.xml"
    } else {
        "ppt/presentation.xml"
    };
    let occurrences = text.matches(primary_part).count();
    if occurrences != 1 {
        return fail("DOC_FORMAT_MISMATCH", format!("expected exactly one {primary_part}, found {occurrences}"));
    }
    ok(adapter_id, AdapterMode::Strict, format!("OOXML container with single primary part {primary_part}"), Vec::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_pdf() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\nstartxref\n9\n%%EOF".to_vec();
        let result = validate_pdf(&pdf, "document_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_pdf_missing_eof() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\nstartxref\n9\n".to_vec();
        let result = validate_pdf(&pdf, "document_adapter_v1");
        assert_eq!(result.fail_code(), Some("DOC_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_pdf_missing_obj_pair() {
        let pdf = b"%PDF-1.7\nstartxref\n9\n%%EOF".to_vec();
        let result = validate_pdf(&pdf, "document_adapter_v1");
        assert_eq!(result.fail_code(), Some("DOC_FORMAT_MISMATCH"));
    }

    #[test]
    fn accepts_well_formed_rtf() {
        let rtf = b"{\\rtf1\\ansi hello}".to_vec();
        let result = validate_rtf(&rtf, "document_adapter_v1");
        assert!(result.is_ok());
    }
}
