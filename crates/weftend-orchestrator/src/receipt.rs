//! Receipt assembly helpers (§4.5 "Receipt build" steps 2, 5, 6).

use weftend_receipt::{digest_with_zeroed_field, OperatorReceipt, SafeRunReceipt, WeftendBuild};
use weftend_util::canon::sort_unique;
use weftend_util::error::WeftEndError;

const FALLBACK_REASON_CODE: &str = "ANALYSIS_ONLY_NO_EXECUTION_LANE";

/// `topReasonCode` = first (by canonical sort) of the concatenation of
/// execution reasons, adapter reasons, intake top reasons, classifier
/// reasons (§4.5 step 2).
#[must_use]
pub fn compute_top_reason_code(
    execution_reasons: &[String],
    adapter_reasons: &[String],
    intake_top_reasons: &[String],
    classifier_reasons: &[String],
) -> String {
    let mut all = Vec::new();
    all.extend_from_slice(execution_reasons);
    all.extend_from_slice(adapter_reasons);
    all.extend_from_slice(intake_top_reasons);
    all.extend_from_slice(classifier_reasons);
    sort_unique(all)
        .into_iter()
        .next()
        .unwrap_or_else(|| FALLBACK_REASON_CODE.to_string())
}

/// Versioned fixed readme text derived from `weftendBuild`/`schemaVersion`
/// (§4.5 step 5).
#[must_use]
pub fn render_readme(build: &WeftendBuild) -> String {
    format!(
        "weftend safe-run output\n\
         schemaVersion: {}\n\
         digestAlgo: {}\n\
         canonicalizationBackend: {}\n\
         \n\
         This directory was produced by a deterministic, local artifact intake\n\
         scan. safe_run_receipt.json and operator_receipt.json are canonical\n\
         JSON; every other file under analysis/, release/, and host/ is listed\n\
         in one of those receipts' subReceipts/entries along with its content\n\
         digest.\n",
        build.schema_version, build.digest_algo, build.canonicalization_backend,
    )
}

/// Finalize a `SafeRunReceipt`'s digest in place (zero-filled-field pattern).
pub fn finalize_safe_run_receipt(receipt: &mut SafeRunReceipt) -> Result<(), WeftEndError> {
    receipt.receipt_digest = digest_with_zeroed_field(receipt, "receiptDigest")
        .map_err(|e| WeftEndError::Internal(format!("safe-run receipt digest failed: {e}")))?;
    Ok(())
}

/// Finalize an `OperatorReceipt`'s digest in place, after its `warnings` have
/// been sort-uniqued.
pub fn finalize_operator_receipt(receipt: &mut OperatorReceipt) -> Result<(), WeftEndError> {
    receipt.warnings = sort_unique(std::mem::take(&mut receipt.warnings));
    receipt.receipt_digest = digest_with_zeroed_field(receipt, "receiptDigest")
        .map_err(|e| WeftEndError::Internal(format!("operator receipt digest failed: {e}")))?;
    Ok(())
}
