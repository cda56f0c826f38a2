//! Structural receipt validators (§7 Internal: "receipt validator rejects a
//! receipt the core itself built — must not occur in practice", §8 property 3).

use weftend_util::error::WeftEndError;

use crate::digest::digest_with_zeroed_field;
use crate::model::{CompareReceipt, OperatorReceipt, SafeRunReceipt};

/// Verify a `SafeRunReceipt`'s internal consistency before it is written:
/// `subReceipts` sorted by name then digest, and `receiptDigest` matches
/// recomputation from the zero-filled canonical form.
pub fn validate_safe_run_receipt(receipt: &SafeRunReceipt) -> Result<(), WeftEndError> {
    if receipt.schema != SafeRunReceipt::SCHEMA {
        return Err(WeftEndError::Internal(format!(
            "unexpected safe-run receipt schema: {}",
            receipt.schema
        )));
    }
    assert_sorted_sub_receipts(&receipt.sub_receipts)?;
    let expected = digest_with_zeroed_field(receipt, "receiptDigest")
        .map_err(|e| WeftEndError::Internal(format!("receipt digest recompute failed: {e}")))?;
    if expected != receipt.receipt_digest {
        return Err(WeftEndError::Internal(
            "safe-run receipt digest does not match its own content".to_string(),
        ));
    }
    Ok(())
}

fn assert_sorted_sub_receipts(
    sub_receipts: &[crate::model::SubReceiptEntry],
) -> Result<(), WeftEndError> {
    for window in sub_receipts.windows(2) {
        let ordering = window[0]
            .name
            .cmp(&window[1].name)
            .then_with(|| window[0].digest.cmp(&window[1].digest));
        if ordering == std::cmp::Ordering::Greater {
            return Err(WeftEndError::Internal(
                "subReceipts is not sorted by name then digest".to_string(),
            ));
        }
    }
    Ok(())
}

/// Verify an `OperatorReceipt`'s `warnings` are sort-unique and its digest
/// matches recomputation.
pub fn validate_operator_receipt(receipt: &OperatorReceipt) -> Result<(), WeftEndError> {
    for window in receipt.warnings.windows(2) {
        if window[0] >= window[1] {
            return Err(WeftEndError::Internal(
                "operator receipt warnings are not sort-unique".to_string(),
            ));
        }
    }
    let expected = digest_with_zeroed_field(receipt, "receiptDigest")
        .map_err(|e| WeftEndError::Internal(format!("receipt digest recompute failed: {e}")))?;
    if expected != receipt.receipt_digest {
        return Err(WeftEndError::Internal(
            "operator receipt digest does not match its own content".to_string(),
        ));
    }
    Ok(())
}

/// Verify a `CompareReceipt`'s `changes` are sorted by bucket and its digest
/// matches recomputation.
pub fn validate_compare_receipt(receipt: &CompareReceipt) -> Result<(), WeftEndError> {
    if receipt.schema != CompareReceipt::SCHEMA {
        return Err(WeftEndError::Internal(format!(
            "unexpected compare receipt schema: {}",
            receipt.schema
        )));
    }
    for window in receipt.changes.windows(2) {
        if window[0].bucket >= window[1].bucket {
            return Err(WeftEndError::Internal(
                "compare receipt changes are not sorted by bucket".to_string(),
            ));
        }
    }
    let expected = digest_with_zeroed_field(receipt, "receiptDigest")
        .map_err(|e| WeftEndError::Internal(format!("receipt digest recompute failed: {e}")))?;
    if expected != receipt.receipt_digest {
        return Err(WeftEndError::Internal(
            "compare receipt digest does not match its own content".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn sample_summary() -> ContentSummary {
        ContentSummary {
            target_kind: "file".to_string(),
            artifact_kind: "TEXT".to_string(),
            file_counts_by_kind: FileCountsByKind::default(),
            total_files: 1,
            total_bytes_bounded: 5,
            top_extensions: vec![],
            has_native_binaries: false,
            has_scripts: false,
            has_html: false,
            external_refs: ExternalRefs::default(),
            entry_hints: vec![],
            boundedness_markers: vec![],
            archive_depth_max: 0,
            nested_archive_count: 0,
            manifest_count: 0,
            strings_indicators: StringsIndicators::default(),
            adapter_signals: None,
            policy_match: PolicyMatch::default(),
            hash_family: HashFamily::default(),
        }
    }

    #[test]
    fn rejects_unsorted_sub_receipts() {
        let mut receipt = SafeRunReceipt {
            schema: SafeRunReceipt::SCHEMA.to_string(),
            schema_version: 0,
            weftend_build: WeftendBuild::default(),
            input_kind: InputKind::Raw,
            artifact_kind: "TEXT".to_string(),
            entry_hint: None,
            analysis_verdict: AnalysisVerdict::Allow,
            execution_verdict: ExecutionVerdict::NotAttempted,
            top_reason_code: "ANALYSIS_ONLY_NO_EXECUTION_LANE".to_string(),
            input_digest: None,
            policy_id: "blake3:abc".to_string(),
            release_id: None,
            release_dir_digest: None,
            intake_decision_digest: None,
            host_receipt_digest: None,
            host_self_status: None,
            host_self_reason_codes: None,
            adapter: None,
            content_summary: sample_summary(),
            execution: ExecutionDetail {
                result: ExecResult::Withheld,
                reason_codes: vec![],
            },
            sub_receipts: vec![
                SubReceiptEntry {
                    name: "z.json".to_string(),
                    digest: "blake3:1".to_string(),
                },
                SubReceiptEntry {
                    name: "a.json".to_string(),
                    digest: "blake3:2".to_string(),
                },
            ],
            receipt_digest: String::new(),
        };
        let digest = digest_with_zeroed_field(&receipt, "receiptDigest").unwrap();
        receipt.receipt_digest = digest;
        assert!(validate_safe_run_receipt(&receipt).is_err());
    }
}
