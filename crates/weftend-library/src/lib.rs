//! Compare engine and library view-state (§4.9, §4.10), grounded on the
//! teacher's `xchecker-gate` policy evaluator (ordered, independently
//! computed predicates) and `xchecker_utils::atomic_write` (pointer-file
//! atomicity).

pub mod compare;
pub mod view;

pub use compare::{bucket_letter, build_compare_receipt, compare_run_receipts, CompareOutcome};
pub use view::{
    accept_baseline, list_run_ids, load_run_receipt, reject_baseline, sanitize_target_key,
    update_view_after_run, write_run_receipt, RunLibraryFacts,
};
