//! The zero-filled-field digest pattern shared by every receipt kind (§3:
//! "`receiptDigest` is the digest of the canonical form with the field
//! zero-filled"; §8 property 3: digest binding).

use anyhow::{Context, Result};
use serde::Serialize;

/// Canonicalize `value`, temporarily blanking `field` to `""` in the
/// top-level JSON object, and digest the result. Used both to compute a
/// receipt's `receiptDigest` before it is set, and to verify one after the
/// fact (§8 property 3).
pub fn digest_with_zeroed_field<T: Serialize>(value: &T, field: &str) -> Result<String> {
    let mut json_value =
        serde_json::to_value(value).with_context(|| "failed to serialize receipt to JSON")?;
    let serde_json::Value::Object(map) = &mut json_value else {
        anyhow::bail!("receipt value is not a JSON object");
    };
    map.insert(field.to_string(), serde_json::Value::String(String::new()));
    weftend_util::canon::digest_canonical(&json_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        a: u32,
        receipt_digest: String,
    }

    #[test]
    fn zeroing_field_ignores_its_prior_value() {
        let s1 = Sample {
            a: 1,
            receipt_digest: String::new(),
        };
        let s2 = Sample {
            a: 1,
            receipt_digest: "stale".to_string(),
        };
        let d1 = digest_with_zeroed_field(&s1, "receipt_digest").unwrap();
        let d2 = digest_with_zeroed_field(&s2, "receipt_digest").unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn differing_payload_yields_differing_digest() {
        let s1 = Sample {
            a: 1,
            receipt_digest: String::new(),
        };
        let s2 = Sample {
            a: 2,
            receipt_digest: String::new(),
        };
        let d1 = digest_with_zeroed_field(&s1, "receipt_digest").unwrap();
        let d2 = digest_with_zeroed_field(&s2, "receipt_digest").unwrap();
        assert_ne!(d1, d2);
    }
}
