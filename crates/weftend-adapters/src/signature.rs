//! Signature adapter (class `signature`, §4.4.h): PEM-enveloped or DER
//! PKCS#7/CMS, plus bare DER X.509 certificates.

use camino::Utf8Path;
use weftend_capture::ArtifactCapture;

use crate::result::AdapterMode;
use crate::shared::{fail, ok, read_bounded, single_file_entry};
use crate::{Adapter, AdapterResult};

const MAX_SIGNATURE_BYTES: u64 = 16 * 1024 * 1024;

pub struct SignatureAdapter;

impl Adapter for SignatureAdapter {
    fn id(&self) -> &'static str {
        "signature_adapter_v1"
    }

    fn class(&self) -> &'static str {
        "signature"
    }

    fn fitness(&self, _path: &Utf8Path, capture: &ArtifactCapture) -> bool {
        single_file_entry(capture).is_some_and(|leaf| {
            let lower = leaf.to_lowercase();
            [".sig", ".p7b", ".p7s", ".der", ".cer", ".pem"]
                .iter()
                .any(|ext| lower.ends_with(*ext))
        })
    }

    fn validate(
        &self,
        path: &Utf8Path,
        capture: &ArtifactCapture,
        _enabled_plugins: &[String],
    ) -> AdapterResult {
        let Some(leaf) = single_file_entry(capture) else {
            return fail("SIGNATURE_FORMAT_MISMATCH", "signature adapter requires a single file input");
        };
        let lower = leaf.to_lowercase();
        let bytes = match read_bounded(path, MAX_SIGNATURE_BYTES) {
            Ok(b) => b,
            Err(e) => return fail("SIGNATURE_FORMAT_MISMATCH", e.to_string()),
        };

        if bytes.starts_with(b"-----BEGIN") {
            return validate_pem(&bytes, &lower, self.id());
        }
        validate_der(&bytes, self.id())
    }
}

fn validate_pem(bytes: &[u8], lower_ext: &str, adapter_id: &str) -> AdapterResult {
    let text = String::from_utf8_lossy(bytes);
    let is_signature_envelope = text.contains("-----BEGIN PKCS7-----") || text.contains("-----BEGIN CMS-----");
    let is_certificate_only = text.contains("-----BEGIN CERTIFICATE-----") && !is_signature_envelope;

    if is_certificate_only && (lower_ext.ends_with(".sig") || lower_ext.ends_with(".p7b")) {
        return fail("SIGNATURE_FORMAT_MISMATCH", "CERTIFICATE-only envelope with .sig/.p7b extension");
    }
    if !is_signature_envelope && !is_certificate_only {
        return fail("SIGNATURE_FORMAT_MISMATCH", "PEM block is neither a signature envelope nor a certificate");
    }
    ok(adapter_id, AdapterMode::Strict, "PEM envelope recognized", Vec::new(), None)
}

fn validate_der(bytes: &[u8], adapter_id: &str) -> AdapterResult {
    if bytes.len() < 2 || bytes[0] != 0x30 {
        return fail("SIGNATURE_FORMAT_MISMATCH", "missing DER SEQUENCE tag");
    }
    let body_start = der_length_header_size(bytes);
    let Some(body_start) = body_start else {
        return fail("SIGNATURE_FORMAT_MISMATCH", "malformed DER length header");
    };
    let window_end = bytes.len().min(body_start + 32);
    let body = &bytes[body_start..window_end];

    // PKCS#7 signedData OID prefix: 2A 86 48 86 F7 0D 01 07 02.
    const PKCS7_SIGNED_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
    if body.windows(PKCS7_SIGNED_DATA_OID.len()).any(|w| w == PKCS7_SIGNED_DATA_OID) {
        return ok(adapter_id, AdapterMode::Strict, "DER PKCS#7 signedData OID present", Vec::new(), None);
    }

    // X.509 Name OID prefix (id-at-commonName family): 06 03 55 04.
    const X509_NAME_OID_PREFIX: &[u8] = &[0x06, 0x03, 0x55, 0x04];
    if body.windows(X509_NAME_OID_PREFIX.len()).any(|w| w == X509_NAME_OID_PREFIX) {
        return ok(adapter_id, AdapterMode::Strict, "bare DER certificate with X.509 Name OID pattern", Vec::new(), None);
    }

    fail("SIGNATURE_FORMAT_MISMATCH", "no signature-envelope or X.509 Name OID evidence in DER body")
}

fn der_length_header_size(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 2 {
        return None;
    }
    let first = bytes[1];
    if first & 0x80 == 0 {
        Some(2)
    } else {
        let extra = (first & 0x7f) as usize;
        if bytes.len() < 2 + extra {
            None
        } else {
            Some(2 + extra)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pkcs7_pem_envelope() {
        let pem = "-----BEGIN PKCS7-----\nMIIB...\n-----END PKCS7-----\n";
        let result = validate_pem(pem.as_bytes(), "a.p7s", "signature_adapter_v1");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_certificate_only_pem_with_sig_extension() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB...\n-----END CERTIFICATE-----\n";
        let result = validate_pem(pem.as_bytes(), "a.sig", "signature_adapter_v1");
        assert_eq!(result.fail_code(), Some("SIGNATURE_FORMAT_MISMATCH"));
    }

    #[test]
    fn rejects_der_without_signature_or_name_oid() {
        let der = vec![0x30, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05];
        let result = validate_der(&der, "signature_adapter_v1");
        assert_eq!(result.fail_code(), Some("SIGNATURE_FORMAT_MISMATCH"));
    }

    #[test]
    fn accepts_der_with_name_oid_near_start() {
        let mut der = vec![0x30, 0x81, 40];
        der.extend_from_slice(&[0x06, 0x03, 0x55, 0x04, 0x03]);
        der.extend(std::iter::repeat(0u8).take(30));
        let result = validate_der(&der, "signature_adapter_v1");
        assert!(result.is_ok());
    }
}
