//! Raw branch (§4.5.b): capture, mint examination, intake decision, adapter
//! routing, and the analysis artifacts they produce.

use camino::Utf8Path;
use serde::Serialize;
use weftend_adapters::{AdapterRegistry, AdapterResult, AdapterSelection, MaintenancePolicy};
use weftend_classify::{ArtifactKind, ClassificationResult};
use weftend_mint::{
    ExaminationOutcome, IntakeAction, IntakeDecisionMaker, IntakeOutcome, LocalIntakeDecisionMaker,
};
use weftend_policy::WeftEndPolicy;
use weftend_util::error::WeftEndError;

/// A per-run tabulation of requested/granted/denied adapter and plugin
/// capabilities (GLOSSARY "Capability ledger").
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityLedger {
    pub requested: Vec<String>,
    pub granted: Vec<String>,
    pub denied: Vec<String>,
}

/// Everything the raw branch produces before execution gating and receipt
/// assembly run.
pub struct RawOutcome {
    pub intake: IntakeOutcome,
    pub adapter_result: Option<AdapterResult>,
    pub ledger: CapabilityLedger,
}

/// Run the intake decision maker and adapter router over `path` (§4.5.b),
/// given the examination and classification the caller already computed.
/// Does not write anything; callers persist the resulting artifacts once the
/// stage directory is ready.
pub fn run_raw_branch(
    path: &Utf8Path,
    examination: &ExaminationOutcome,
    _classification: &ClassificationResult,
    policy: &WeftEndPolicy,
    registry: &AdapterRegistry,
    adapter_selection: &AdapterSelection,
    enabled_plugins: &[String],
    maintenance: &MaintenancePolicy,
) -> Result<RawOutcome, WeftEndError> {
    let decision_maker = LocalIntakeDecisionMaker;
    let intake = decision_maker.build_intake_decision(&examination.mint, policy)?;

    let adapter_result = weftend_adapters::route(
        registry,
        adapter_selection,
        enabled_plugins,
        maintenance,
        path,
        &examination.capture,
    )?;

    let mut ledger = CapabilityLedger::default();
    if let AdapterSelection::Class(class) = adapter_selection {
        ledger.requested.push(class.clone());
    }
    for plugin in enabled_plugins {
        ledger.requested.push(plugin.clone());
    }
    match &adapter_result {
        Some(AdapterResult::Ok { adapter_id, .. }) => ledger.granted.push(adapter_id.clone()),
        Some(AdapterResult::Fail { fail_code, .. }) => ledger.denied.push(fail_code.clone()),
        None => {}
    }
    ledger.requested.sort();
    ledger.requested.dedup();
    ledger.granted.sort();
    ledger.granted.dedup();
    ledger.denied.sort();
    ledger.denied.dedup();

    Ok(RawOutcome {
        intake,
        adapter_result,
        ledger,
    })
}

#[must_use]
pub fn adapter_failed(outcome: &RawOutcome) -> bool {
    matches!(outcome.adapter_result, Some(AdapterResult::Fail { .. }))
}

#[must_use]
pub fn adapter_fail_code(outcome: &RawOutcome) -> Option<&str> {
    match &outcome.adapter_result {
        Some(AdapterResult::Fail { fail_code, .. }) => Some(fail_code),
        _ => None,
    }
}

#[must_use]
pub fn execution_eligible(kind: ArtifactKind) -> bool {
    kind.is_execution_eligible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_classify::classify;
    use weftend_mint::{ArtifactExaminer, LocalExaminer};
    use weftend_policy::default_policy;

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn raw_branch_runs_end_to_end_on_plain_text() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello world").unwrap();
        let path = utf8(dir.path());
        let examiner = LocalExaminer::default();
        let examination = examiner.examine_artifact(&path, None).unwrap();
        let classification = classify(&path, &examination.capture);
        assert_eq!(classification.kind, ArtifactKind::Text);

        let registry = AdapterRegistry::default();
        let outcome = run_raw_branch(
            &path,
            &examination,
            &classification,
            &default_policy(),
            &registry,
            &AdapterSelection::None,
            &[],
            &MaintenancePolicy::default(),
        )
        .unwrap();
        assert_eq!(outcome.intake.decision.action, IntakeAction::Approve);
        assert!(outcome.adapter_result.is_none());
    }
}
