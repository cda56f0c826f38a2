//! Compare engine (§4.10): sixteen independent change buckets over two
//! normalized run receipts, folded into a `CompareReceipt`.

use weftend_receipt::{
    ChangeCounts, ChangeEntry, CompareReceipt, CompareSide, CompareVerdict, PrivacyLintVerdict,
    RunReceipt,
};
use weftend_util::canon::sort_unique_bounded;

const ADDED_REMOVED_LIMIT: usize = 50;

struct Bucket {
    name: &'static str,
    added: Vec<String>,
    removed: Vec<String>,
    counts: Option<ChangeCounts>,
}

fn scalar_bucket(name: &'static str, triggered: bool) -> Option<Bucket> {
    triggered.then(|| Bucket {
        name,
        added: Vec::new(),
        removed: Vec::new(),
        counts: None,
    })
}

fn set_bucket(name: &'static str, left: &[String], right: &[String]) -> Option<Bucket> {
    let left_set: std::collections::BTreeSet<&String> = left.iter().collect();
    let right_set: std::collections::BTreeSet<&String> = right.iter().collect();
    let added: Vec<String> = right_set.difference(&left_set).map(|s| (*s).clone()).collect();
    let removed: Vec<String> = left_set.difference(&right_set).map(|s| (*s).clone()).collect();
    if added.is_empty() && removed.is_empty() {
        return None;
    }
    Some(Bucket {
        name,
        added: sort_unique_bounded(added, ADDED_REMOVED_LIMIT),
        removed: sort_unique_bounded(removed, ADDED_REMOVED_LIMIT),
        counts: Some(ChangeCounts {
            left: Some(left.len() as u64),
            right: Some(right.len() as u64),
        }),
    })
}

/// Compute the independent change buckets between `left` and `right` (§4.10
/// trigger table). Order is the fixed table order, not discovery order.
fn compute_buckets(left: &RunReceipt, right: &RunReceipt) -> Vec<Bucket> {
    let denied_left_set: std::collections::BTreeSet<&String> = left.denied_caps.iter().collect();
    let denied_right_set: std::collections::BTreeSet<&String> = right.denied_caps.iter().collect();
    let caps_changed = left.cap_counters != right.cap_counters
        || denied_left_set != denied_right_set;

    [
        scalar_bucket("VERDICT_CHANGED", left.result != right.result),
        scalar_bucket("EXITCODE_CHANGED", left.exit_code != right.exit_code),
        set_bucket("REASONS_CHANGED", &left.reason_codes, &right.reason_codes),
        scalar_bucket("DIGEST_CHANGED", left.artifact_digest != right.artifact_digest),
        scalar_bucket("POLICY_CHANGED", left.policy_digest != right.policy_digest),
        scalar_bucket(
            "EXTERNALREFS_CHANGED",
            left.external_ref_count != right.external_ref_count
                || left.unique_domain_count != right.unique_domain_count,
        ),
        scalar_bucket(
            "KIND_PROFILE_CHANGED",
            left.target_kind != right.target_kind || left.artifact_kind != right.artifact_kind,
        ),
        scalar_bucket(
            "CONTENT_CHANGED",
            left.total_files != right.total_files
                || left.total_bytes_bounded != right.total_bytes_bounded
                || left.file_counts_by_kind != right.file_counts_by_kind,
        ),
        scalar_bucket("SCRIPT_SURFACE_CHANGED", left.has_scripts != right.has_scripts),
        scalar_bucket(
            "NATIVE_BINARY_APPEARED",
            left.has_native_binaries != right.has_native_binaries,
        ),
        scalar_bucket("URL_INDICATORS_CHANGED", left.url_like_count != right.url_like_count),
        scalar_bucket(
            "SIGNATURE_STATUS_CHANGED",
            left.signature_present != right.signature_present
                || left.timestamp_present != right.timestamp_present,
        ),
        scalar_bucket(
            "ARCHIVE_DEPTH_CHANGED",
            left.archive_depth_max != right.archive_depth_max
                || left.nested_archive_count != right.nested_archive_count,
        ),
        set_bucket("BOUNDS_CHANGED", &left.boundedness_markers, &right.boundedness_markers),
        scalar_bucket("CAPS_CHANGED", caps_changed),
        scalar_bucket(
            "HOST_TRUTH_CHANGED",
            left.host_release_status != right.host_release_status
                || left.strict_verify != right.strict_verify
                || left.strict_execute != right.strict_execute,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Fold a bucket name into the short single-letter code used by library view
/// keys (§4.10): buckets outside the seven named families collapse into `C`
/// (the "content family" catch-all).
#[must_use]
pub fn bucket_letter(bucket: &str) -> char {
    match bucket {
        "DIGEST_CHANGED" => 'D',
        "EXTERNALREFS_CHANGED" => 'X',
        "REASONS_CHANGED" => 'R',
        "POLICY_CHANGED" => 'P',
        "HOST_TRUTH_CHANGED" => 'H',
        "BOUNDS_CHANGED" => 'B',
        _ => 'C',
    }
}

/// The non-receipt half of a compare result (§4.10): verdict, bucket names,
/// and the full per-bucket change detail.
pub struct CompareOutcome {
    pub verdict: CompareVerdict,
    pub change_buckets: Vec<String>,
    pub changes: Vec<ChangeEntry>,
}

/// Compare two normalized run receipts and produce the bucket-level outcome
/// (§4.10). `verdict = SAME` iff no bucket fired.
#[must_use]
pub fn compare_run_receipts(left: &RunReceipt, right: &RunReceipt) -> CompareOutcome {
    let buckets = compute_buckets(left, right);
    let change_buckets: Vec<String> = buckets.iter().map(|b| b.name.to_string()).collect();
    let verdict = if change_buckets.is_empty() {
        CompareVerdict::Same
    } else {
        CompareVerdict::Changed
    };
    let changes = buckets
        .into_iter()
        .map(|b| ChangeEntry {
            bucket: b.name.to_string(),
            added: b.added,
            removed: b.removed,
            counts: b.counts,
        })
        .collect();
    CompareOutcome {
        verdict,
        change_buckets,
        changes,
    }
}

/// Build the full `CompareReceipt`, including its zero-filled-field digest.
pub fn build_compare_receipt(
    left_summary_digest: String,
    left_receipt_kinds: Vec<String>,
    right_summary_digest: String,
    right_receipt_kinds: Vec<String>,
    outcome: CompareOutcome,
    privacy_lint: PrivacyLintVerdict,
    reason_codes: Vec<String>,
) -> anyhow::Result<CompareReceipt> {
    let mut receipt = CompareReceipt {
        schema: CompareReceipt::SCHEMA.to_string(),
        left: CompareSide {
            summary_digest: left_summary_digest,
            receipt_kinds: left_receipt_kinds,
        },
        right: CompareSide {
            summary_digest: right_summary_digest,
            receipt_kinds: right_receipt_kinds,
        },
        verdict: outcome.verdict,
        change_buckets: outcome.change_buckets,
        changes: outcome.changes,
        privacy_lint,
        reason_codes: weftend_util::canon::sort_unique(reason_codes),
        receipt_digest: String::new(),
    };
    receipt.receipt_digest = weftend_receipt::digest_with_zeroed_field(&receipt, "receiptDigest")?;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weftend_receipt::{ExecResult, FileCountsByKind};

    fn sample() -> RunReceipt {
        RunReceipt {
            result: ExecResult::Allow,
            exit_code: 0,
            reason_codes: vec!["ANALYSIS_ONLY_NO_EXECUTION_LANE".to_string()],
            artifact_digest: "blake3:aaa".to_string(),
            policy_digest: "blake3:policy".to_string(),
            external_ref_count: 0,
            unique_domain_count: 0,
            target_kind: "dir".to_string(),
            artifact_kind: "TEXT".to_string(),
            total_files: 3,
            total_bytes_bounded: 30,
            file_counts_by_kind: FileCountsByKind::default(),
            has_scripts: false,
            has_native_binaries: false,
            url_like_count: 0,
            signature_present: false,
            timestamp_present: false,
            archive_depth_max: 0,
            nested_archive_count: 0,
            boundedness_markers: vec![],
            cap_counters: BTreeMap::new(),
            denied_caps: vec![],
            host_release_status: None,
            strict_verify: false,
            strict_execute: false,
        }
    }

    #[test]
    fn identical_receipts_compare_same() {
        let left = sample();
        let right = sample();
        let outcome = compare_run_receipts(&left, &right);
        assert_eq!(outcome.verdict, CompareVerdict::Same);
        assert!(outcome.change_buckets.is_empty());
    }

    #[test]
    fn digest_change_is_detected_and_lettered_d() {
        let left = sample();
        let mut right = sample();
        right.artifact_digest = "blake3:bbb".to_string();
        let outcome = compare_run_receipts(&left, &right);
        assert_eq!(outcome.change_buckets, vec!["DIGEST_CHANGED".to_string()]);
        assert_eq!(bucket_letter("DIGEST_CHANGED"), 'D');
    }

    #[test]
    fn bucket_presence_is_symmetric() {
        let left = sample();
        let mut right = sample();
        right.total_files = 4;
        right.reason_codes.push("EXTRA_REASON".to_string());

        let forward = compare_run_receipts(&left, &right);
        let backward = compare_run_receipts(&right, &left);
        assert_eq!(forward.change_buckets, backward.change_buckets);
    }

    #[test]
    fn content_change_collapses_to_letter_c() {
        assert_eq!(bucket_letter("CONTENT_CHANGED"), 'C');
        assert_eq!(bucket_letter("SCRIPT_SURFACE_CHANGED"), 'C');
    }
}
