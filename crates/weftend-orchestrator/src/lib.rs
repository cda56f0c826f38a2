//! Safe-run orchestrator (§4.5): wires preconditions, the release/raw branch
//! split, execution gating, evidence self-verification, and receipt assembly
//! into one staged, atomic pipeline.

pub mod evidence;
pub mod execution;
pub mod maintenance;
pub mod raw;
pub mod receipt;
pub mod release;
pub mod request;

pub use request::{check_preconditions, SafeRunRequest};

use camino::{Utf8Path, Utf8PathBuf};
use weftend_adapters::{AdapterRegistry, AdapterResult, MaintenancePolicy};
use weftend_classify::{classify, ArtifactKind, ClassificationResult};
use weftend_library::{sanitize_target_key, update_view_after_run, RunLibraryFacts};
use weftend_mint::{ArtifactExaminer, ExaminationOutcome, HostRunner, LocalExaminer, LocalHostRunner};
use weftend_policy::WeftEndPolicy;
use weftend_receipt::{
    validate::{validate_operator_receipt, validate_safe_run_receipt},
    writer::write_evidence_file,
    AdapterMode, AdapterRef, AdapterSignals, AnalysisVerdict, ExecResult, ExecutionDetail,
    ExecutionVerdict, HostSelfStatus, InputKind, OperatorReceipt, OperatorReceiptEntry,
    PolicyMatch, PrivacyLintVerdict, RunReceipt, SafeRunReceipt, SubReceiptEntry, WeftendBuild,
};
use weftend_redaction::privacy_lint;
use weftend_summary::build_content_summary;
use weftend_util::atomic::{stage_dir, write_file_atomic, write_json_atomic};
use weftend_util::canon::{canonical_string, digest_canonical, digest_file, sort_unique};
use weftend_util::error::{ExitCode, WeftEndError};

/// The final outcome of one `safe-run` invocation: the receipts a caller
/// (the CLI) reports, and the process exit code they imply.
#[derive(Debug)]
pub struct SafeRunOutcome {
    pub exit_code: ExitCode,
    pub safe_run_receipt: SafeRunReceipt,
    pub operator_receipt: OperatorReceipt,
}

/// Run the full safe-run pipeline (§4.5): preconditions, staged write,
/// release-or-raw branch, execution gating, evidence self-verification,
/// privacy lint, receipt assembly, and a best-effort library view update.
pub fn safe_run(request: &SafeRunRequest) -> Result<SafeRunOutcome, WeftEndError> {
    let preconditions = check_preconditions(request)?;
    let policy = preconditions.canonical_policy.policy.clone();
    let policy_id = preconditions.canonical_policy.policy_id.clone();
    let had_preexisting_output = request::out_dir_has_preexisting_output(&request.out_dir);
    let maintenance = maintenance::maintenance_policy_from_env()?;
    let registry = AdapterRegistry::default();

    let result = stage_dir(&request.out_dir, |stage| {
        run_in_stage(
            request,
            &policy,
            &policy_id,
            stage,
            &registry,
            &maintenance,
            had_preexisting_output,
        )
        .map_err(anyhow::Error::from)
    });

    result.map_err(into_weftend_error)
}

/// Evidence-index `kind` for an operator receipt entry, derived from the
/// artifact's path within the stage directory (§4.5 step 6).
fn operator_receipt_entry_kind(rel_path: &str) -> &'static str {
    if rel_path == "safe_run_receipt.json" {
        "safeRunReceipt"
    } else if rel_path == "weftend/README.txt" {
        "readme"
    } else if rel_path == "host/host_run_receipt.json" {
        "hostReceipt"
    } else if rel_path.starts_with("analysis/") {
        "analysisArtifact"
    } else if rel_path.starts_with("release/") {
        "releaseArtifact"
    } else {
        "artifact"
    }
}

fn into_weftend_error(err: anyhow::Error) -> WeftEndError {
    match err.downcast::<WeftEndError>() {
        Ok(weftend_err) => weftend_err,
        Err(other) => WeftEndError::Internal(other.to_string()),
    }
}

/// Everything the release/raw branches contribute to the final receipt.
struct BranchOutcome {
    analysis_verdict: AnalysisVerdict,
    execution_verdict: ExecutionVerdict,
    execution_result: ExecResult,
    execution_reason_codes: Vec<String>,
    adapter_reason_codes: Vec<String>,
    intake_top_reasons: Vec<String>,
    adapter_ref: Option<AdapterRef>,
    adapter_signals: Option<AdapterSignals>,
    host_self_status: Option<HostSelfStatus>,
    host_self_reason_codes: Option<Vec<String>>,
    host_receipt_digest: Option<String>,
    release_id: Option<String>,
    release_dir_digest: Option<String>,
    intake_decision_digest: Option<String>,
    policy_match_reason_codes: Vec<String>,
    denied_caps: Vec<String>,
}

fn run_in_stage(
    request: &SafeRunRequest,
    policy: &WeftEndPolicy,
    policy_id: &str,
    stage: &Utf8Path,
    registry: &AdapterRegistry,
    maintenance: &MaintenancePolicy,
    had_preexisting_output: bool,
) -> Result<SafeRunOutcome, WeftEndError> {
    let build = WeftendBuild::default();

    let examiner = LocalExaminer::default();
    let examination = examiner.examine_artifact(&request.input_path, None)?;
    let classification = classify(&request.input_path, &examination.capture);
    let kind = classification.kind;

    let target_kind = match examination.capture.kind {
        weftend_capture::CaptureKind::File => "file",
        weftend_capture::CaptureKind::Dir => "dir",
        weftend_capture::CaptureKind::Zip => "zip",
    };

    let mut sub_receipts: Vec<SubReceiptEntry> = Vec::new();

    let branch = if kind == ArtifactKind::ReleaseDir {
        run_release_branch(request, stage, &mut sub_receipts)?
    } else {
        run_raw_branch_flow(
            request,
            policy,
            stage,
            registry,
            maintenance,
            &examination,
            &classification,
            &mut sub_receipts,
        )?
    };

    let policy_match = PolicyMatch {
        selected_policy: policy.profile.as_str().to_string(),
        reason_codes: branch.policy_match_reason_codes.clone(),
    };

    let content_summary = build_content_summary(
        &request.input_path,
        target_kind,
        kind,
        &examination.capture,
        &examination.mint,
        policy_match,
        branch.adapter_signals.clone(),
    );

    let top_reason_code = receipt::compute_top_reason_code(
        &branch.execution_reason_codes,
        &branch.adapter_reason_codes,
        &branch.intake_top_reasons,
        &classification.reason_codes,
    );

    sub_receipts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.digest.cmp(&b.digest)));
    sub_receipts.dedup_by(|a, b| a.name == b.name && a.digest == b.digest);

    let mut safe_run_receipt = SafeRunReceipt {
        schema: SafeRunReceipt::SCHEMA.to_string(),
        schema_version: build.schema_version,
        weftend_build: build.clone(),
        input_kind: if kind == ArtifactKind::ReleaseDir {
            InputKind::Release
        } else {
            InputKind::Raw
        },
        artifact_kind: kind.as_str().to_string(),
        entry_hint: classification.entry_hint.clone(),
        analysis_verdict: branch.analysis_verdict,
        execution_verdict: branch.execution_verdict,
        top_reason_code,
        input_digest: Some(examination.mint.input_digest.clone()),
        policy_id: policy_id.to_string(),
        release_id: branch.release_id.clone(),
        release_dir_digest: branch.release_dir_digest.clone(),
        intake_decision_digest: branch.intake_decision_digest.clone(),
        host_receipt_digest: branch.host_receipt_digest.clone(),
        host_self_status: branch.host_self_status,
        host_self_reason_codes: branch.host_self_reason_codes.clone(),
        adapter: branch.adapter_ref.clone(),
        content_summary: content_summary.clone(),
        execution: ExecutionDetail {
            result: branch.execution_result,
            reason_codes: branch.execution_reason_codes.clone(),
        },
        sub_receipts,
        receipt_digest: String::new(),
    };
    receipt::finalize_safe_run_receipt(&mut safe_run_receipt)?;
    validate_safe_run_receipt(&safe_run_receipt)?;

    let safe_run_entry = write_evidence_file(stage, "safe_run_receipt.json", &safe_run_receipt)?;

    let readme_text = receipt::render_readme(&build);
    let readme_path = stage.join("weftend").join("README.txt");
    write_file_atomic(&readme_path, &readme_text)
        .map_err(|e| WeftEndError::Internal(format!("failed to write README: {e}")))?;
    let readme_digest = digest_file(&readme_path)
        .map_err(|e| WeftEndError::Internal(format!("failed to digest README: {e}")))?;

    let mut declared: Vec<evidence::DeclaredArtifact> = safe_run_receipt
        .sub_receipts
        .iter()
        .map(|s| evidence::DeclaredArtifact {
            rel_path: s.name.clone(),
            digest: s.digest.clone(),
        })
        .collect();
    declared.push(evidence::DeclaredArtifact {
        rel_path: "safe_run_receipt.json".to_string(),
        digest: safe_run_entry.digest.clone(),
    });
    declared.push(evidence::DeclaredArtifact {
        rel_path: "weftend/README.txt".to_string(),
        digest: readme_digest,
    });

    let mut warnings = evidence::verify_evidence(stage, &declared);
    if had_preexisting_output && !warnings.iter().any(|w| w == "SAFE_RUN_EVIDENCE_ORPHAN_OUTPUT") {
        warnings.push("SAFE_RUN_EVIDENCE_ORPHAN_OUTPUT".to_string());
    }

    let privacy_report = privacy_lint(stage)
        .map_err(|e| WeftEndError::Internal(format!("privacy lint failed: {e}")))?;
    let privacy_verdict = match privacy_report.verdict {
        weftend_redaction::PrivacyVerdict::Pass => PrivacyLintVerdict::Pass,
        weftend_redaction::PrivacyVerdict::Fail => PrivacyLintVerdict::Fail,
    };
    warnings.extend(privacy_report.reason_codes);
    let warnings = sort_unique(warnings);

    let mut receipts: Vec<OperatorReceiptEntry> = declared
        .iter()
        .map(|d| OperatorReceiptEntry {
            kind: operator_receipt_entry_kind(&d.rel_path).to_string(),
            rel_path: d.rel_path.clone(),
            digest: d.digest.clone(),
        })
        .collect();
    receipts.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    let mut operator_receipt = OperatorReceipt {
        command: "safe-run".to_string(),
        weftend_build: build.clone(),
        schema_version: build.schema_version,
        receipts,
        warnings,
        content_summary: Some(content_summary),
        privacy_lint: privacy_verdict,
        receipt_digest: String::new(),
    };
    receipt::finalize_operator_receipt(&mut operator_receipt)?;
    validate_operator_receipt(&operator_receipt)?;
    write_evidence_file(stage, "operator_receipt.json", &operator_receipt)?;

    let exit_code = if safe_run_receipt.analysis_verdict == AnalysisVerdict::Deny {
        ExitCode::FAIL_CLOSED
    } else {
        ExitCode::SUCCESS
    };

    update_library_view(request, policy_id, &safe_run_receipt, &branch, exit_code, privacy_verdict);

    Ok(SafeRunOutcome {
        exit_code,
        safe_run_receipt,
        operator_receipt,
    })
}

fn run_release_branch(
    request: &SafeRunRequest,
    stage: &Utf8Path,
    sub_receipts: &mut Vec<SubReceiptEntry>,
) -> Result<BranchOutcome, WeftEndError> {
    let release_dir = &request.input_path;
    match release::load_release_meta(release_dir) {
        release::ReleaseMetaOutcome::Fatal { reason_code } => Ok(BranchOutcome {
            analysis_verdict: AnalysisVerdict::Deny,
            execution_verdict: ExecutionVerdict::NotAttempted,
            execution_result: ExecResult::Deny,
            execution_reason_codes: vec![reason_code],
            adapter_reason_codes: vec![],
            intake_top_reasons: vec![],
            adapter_ref: None,
            adapter_signals: None,
            host_self_status: None,
            host_self_reason_codes: None,
            host_receipt_digest: None,
            release_id: None,
            release_dir_digest: None,
            intake_decision_digest: None,
            policy_match_reason_codes: vec![],
            denied_caps: vec![],
        }),
        release::ReleaseMetaOutcome::Loaded(files) => {
            persist_release_files(stage, &files, sub_receipts)?;

            let release_id = release_dir.file_name().map(ToString::to_string);
            let release_dir_digest = Some(release::release_dir_digest(&files)?);

            let runner = LocalHostRunner;
            let host_out = stage.join("host");
            let host_receipt =
                release::run_or_withhold(&runner, request.execute_requested, release_dir, &host_out)?;

            let Some(host_receipt) = host_receipt else {
                return Ok(BranchOutcome {
                    analysis_verdict: AnalysisVerdict::Withheld,
                    execution_verdict: ExecutionVerdict::NotAttempted,
                    execution_result: ExecResult::Withheld,
                    execution_reason_codes: vec!["SAFE_RUN_EXECUTION_NOT_REQUESTED".to_string()],
                    adapter_reason_codes: vec![],
                    intake_top_reasons: vec![],
                    adapter_ref: None,
                    adapter_signals: None,
                    host_self_status: None,
                    host_self_reason_codes: None,
                    host_receipt_digest: None,
                    release_id,
                    release_dir_digest,
                    intake_decision_digest: None,
                    policy_match_reason_codes: vec![],
                    denied_caps: vec![],
                });
            };

            let entry = write_evidence_file(stage, "host/host_run_receipt.json", &host_receipt)?;
            sub_receipts.push(entry);

            let status = map_host_status(&host_receipt.status);

            Ok(BranchOutcome {
                analysis_verdict: AnalysisVerdict::Allow,
                execution_verdict: ExecutionVerdict::Allow,
                execution_result: ExecResult::Allow,
                execution_reason_codes: host_receipt.reason_codes.clone(),
                adapter_reason_codes: vec![],
                intake_top_reasons: vec![],
                adapter_ref: None,
                adapter_signals: None,
                host_self_status: Some(status),
                host_self_reason_codes: Some(host_receipt.reason_codes.clone()),
                host_receipt_digest: Some(host_receipt.digest),
                release_id,
                release_dir_digest,
                intake_decision_digest: None,
                policy_match_reason_codes: vec![],
                denied_caps: vec![],
            })
        }
    }
}

fn persist_release_files(
    stage: &Utf8Path,
    files: &[release::ReleaseMetaFile],
    sub_receipts: &mut Vec<SubReceiptEntry>,
) -> Result<(), WeftEndError> {
    for f in files {
        let rel = format!("release/{}", f.name);
        let path = stage.join(&rel);
        let text = String::from_utf8_lossy(&f.bytes).into_owned();
        write_file_atomic(&path, &text)
            .map_err(|e| WeftEndError::Internal(format!("failed to write {rel}: {e}")))?;
        let digest = digest_file(&path)
            .map_err(|e| WeftEndError::Internal(format!("failed to digest {rel}: {e}")))?;
        sub_receipts.push(SubReceiptEntry { name: rel, digest });
    }
    Ok(())
}

fn map_host_status(status: &str) -> HostSelfStatus {
    match status {
        "OK" => HostSelfStatus::Ok,
        "UNVERIFIED" => HostSelfStatus::Unverified,
        _ => HostSelfStatus::Missing,
    }
}

#[allow(clippy::too_many_arguments)]
fn run_raw_branch_flow(
    request: &SafeRunRequest,
    policy: &WeftEndPolicy,
    stage: &Utf8Path,
    registry: &AdapterRegistry,
    maintenance: &MaintenancePolicy,
    examination: &ExaminationOutcome,
    classification: &ClassificationResult,
    sub_receipts: &mut Vec<SubReceiptEntry>,
) -> Result<BranchOutcome, WeftEndError> {
    let raw = raw::run_raw_branch(
        &request.input_path,
        examination,
        classification,
        policy,
        registry,
        &request.adapter,
        &request.enabled_plugins,
        maintenance,
    )?;

    sub_receipts.push(write_evidence_file(
        stage,
        "analysis/weftend_mint_v1.json",
        &examination.mint,
    )?);

    let mint_txt_path = stage.join("analysis/weftend_mint_v1.txt");
    write_file_atomic(&mint_txt_path, &examination.report)
        .map_err(|e| WeftEndError::Internal(format!("failed to write mint report: {e}")))?;
    let mint_txt_digest = digest_file(&mint_txt_path)
        .map_err(|e| WeftEndError::Internal(format!("failed to digest mint report: {e}")))?;
    sub_receipts.push(SubReceiptEntry {
        name: "analysis/weftend_mint_v1.txt".to_string(),
        digest: mint_txt_digest,
    });

    sub_receipts.push(write_evidence_file(
        stage,
        "analysis/intake_decision.json",
        &raw.intake.decision,
    )?);

    let disclosure_path = stage.join("analysis/disclosure.txt");
    write_file_atomic(&disclosure_path, &raw.intake.disclosure)
        .map_err(|e| WeftEndError::Internal(format!("failed to write disclosure: {e}")))?;
    let disclosure_digest = digest_file(&disclosure_path)
        .map_err(|e| WeftEndError::Internal(format!("failed to digest disclosure: {e}")))?;
    sub_receipts.push(SubReceiptEntry {
        name: "analysis/disclosure.txt".to_string(),
        digest: disclosure_digest,
    });

    sub_receipts.push(write_evidence_file(
        stage,
        "analysis/appeal_bundle.json",
        &raw.intake.appeal,
    )?);
    sub_receipts.push(write_evidence_file(
        stage,
        "analysis/capability_ledger_v0.json",
        &raw.ledger,
    )?);

    let intake_decision_digest = Some(
        digest_canonical(&raw.intake.decision)
            .map_err(|e| WeftEndError::Internal(format!("intake decision digest failed: {e}")))?,
    );

    let mut adapter_ref = None;
    let mut adapter_signals = None;
    let mut adapter_reason_codes = Vec::new();

    if let Some(result) = &raw.adapter_result {
        match result {
            AdapterResult::Ok {
                adapter_id,
                mode,
                summary,
                findings,
                adapter_signals: signals,
                reason_codes,
            } => {
                sub_receipts.push(write_evidence_file(
                    stage,
                    "analysis/adapter_summary_v0.json",
                    &serde_json::json!({ "adapterId": adapter_id, "summary": summary }),
                )?);
                sub_receipts.push(write_evidence_file(
                    stage,
                    "analysis/adapter_findings_v0.json",
                    findings,
                )?);
                adapter_ref = Some(AdapterRef {
                    adapter_id: adapter_id.clone(),
                    mode: convert_adapter_mode(*mode),
                });
                adapter_signals = signals.as_ref().map(|s| AdapterSignals {
                    class: s.class.clone(),
                    extra: s.extra.clone(),
                });
                adapter_reason_codes = reason_codes.clone();
            }
            AdapterResult::Fail {
                fail_code,
                reason_codes,
                ..
            } => {
                return Ok(BranchOutcome {
                    analysis_verdict: AnalysisVerdict::Deny,
                    execution_verdict: ExecutionVerdict::NotAttempted,
                    execution_result: ExecResult::Deny,
                    execution_reason_codes: vec![fail_code.clone()],
                    adapter_reason_codes: reason_codes.clone(),
                    intake_top_reasons: raw.intake.decision.top_reasons.clone(),
                    adapter_ref: None,
                    adapter_signals: None,
                    host_self_status: None,
                    host_self_reason_codes: None,
                    host_receipt_digest: None,
                    release_id: None,
                    release_dir_digest: None,
                    intake_decision_digest,
                    policy_match_reason_codes: vec![],
                    denied_caps: raw.ledger.denied.clone(),
                });
            }
        }
    }

    let gate = execution::gate_execution(
        request.withhold_exec,
        request.execute_requested,
        raw.intake.decision.action,
        classification.kind,
    );

    let mut execution_reason_codes = gate.reason_codes.clone();
    let mut host_self_status = None;
    let mut host_self_reason_codes = None;
    let mut host_receipt_digest = None;

    if gate.should_attempt {
        let release_dir = stage.join("release");
        build_synthesized_release(&release_dir, &request.input_path, examination)?;
        for name in ["release_manifest.json", "runtime_bundle.json"] {
            let rel = format!("release/{name}");
            let digest = digest_file(&release_dir.join(name))
                .map_err(|e| WeftEndError::Internal(format!("failed to digest {rel}: {e}")))?;
            sub_receipts.push(SubReceiptEntry { name: rel, digest });
        }

        let runner = LocalHostRunner;
        let host_out = stage.join("host");
        let host_receipt = runner.host_run_strict(&release_dir, &host_out)?;
        sub_receipts.push(write_evidence_file(stage, "host/host_run_receipt.json", &host_receipt)?);

        host_self_status = Some(map_host_status(&host_receipt.status));
        execution_reason_codes.extend(host_receipt.reason_codes.clone());
        host_self_reason_codes = Some(host_receipt.reason_codes.clone());
        host_receipt_digest = Some(host_receipt.digest);
    }

    Ok(BranchOutcome {
        analysis_verdict: AnalysisVerdict::Allow,
        execution_verdict: gate.verdict,
        execution_result: gate.exec_result(),
        execution_reason_codes: sort_unique(execution_reason_codes),
        adapter_reason_codes,
        intake_top_reasons: raw.intake.decision.top_reasons.clone(),
        adapter_ref,
        adapter_signals,
        host_self_status,
        host_self_reason_codes,
        host_receipt_digest,
        release_id: None,
        release_dir_digest: None,
        intake_decision_digest,
        policy_match_reason_codes: vec![],
        denied_caps: raw.ledger.denied.clone(),
    })
}

fn convert_adapter_mode(mode: weftend_adapters::AdapterMode) -> AdapterMode {
    match mode {
        weftend_adapters::AdapterMode::Strict => AdapterMode::Strict,
        weftend_adapters::AdapterMode::Plugin => AdapterMode::Plugin,
    }
}

/// Synthesize a minimal `release/` bundle for a raw-branch host run: the raw
/// branch has no externally supplied release metadata, so the orchestrator
/// builds just enough of one (manifest + bundle referencing the input
/// digest) for `LocalHostRunner` to operate on.
fn build_synthesized_release(
    release_dir: &Utf8Path,
    input_path: &Utf8Path,
    examination: &ExaminationOutcome,
) -> Result<(), WeftEndError> {
    std::fs::create_dir_all(release_dir.as_std_path())
        .map_err(|e| WeftEndError::Internal(format!("failed to create {release_dir}: {e}")))?;

    let manifest = serde_json::json!({
        "inputDigest": examination.mint.input_digest,
        "source": input_path.to_string(),
    });
    let manifest_text = canonical_string(&manifest)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize release manifest: {e}")))?;
    write_json_atomic(&release_dir.join("release_manifest.json"), &manifest_text)
        .map_err(|e| WeftEndError::Internal(format!("failed to write release manifest: {e}")))?;

    let runtime_bundle = serde_json::json!({ "entry": input_path.file_name() });
    let runtime_text = canonical_string(&runtime_bundle)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize runtime bundle: {e}")))?;
    write_json_atomic(&release_dir.join("runtime_bundle.json"), &runtime_text)
        .map_err(|e| WeftEndError::Internal(format!("failed to write runtime bundle: {e}")))?;

    Ok(())
}

const DEFAULT_LIBRARY_ROOT: &str = "./Library";

fn derive_run_id(receipt_digest: &str) -> String {
    let hex = receipt_digest.rsplit(':').next().unwrap_or(receipt_digest);
    format!("run_{}", &hex[..hex.len().min(12)])
}

/// Apply this run to the library view-state (§4.9). Best-effort: any
/// failure here is logged and does not affect the safe-run exit code.
fn update_library_view(
    request: &SafeRunRequest,
    policy_id: &str,
    safe_run_receipt: &SafeRunReceipt,
    branch: &BranchOutcome,
    exit_code: ExitCode,
    privacy_verdict: PrivacyLintVerdict,
) {
    let raw_root = std::env::var("WEFTEND_LIBRARY_ROOT").unwrap_or_else(|_| DEFAULT_LIBRARY_ROOT.to_string());
    let library_root = match Utf8PathBuf::from_path_buf(std::path::PathBuf::from(raw_root)) {
        Ok(path) => path,
        Err(_) => {
            tracing::warn!("WEFTEND_LIBRARY_ROOT is not valid UTF-8; skipping library view update");
            return;
        }
    };

    let leaf = request.input_path.file_name().unwrap_or("artifact");
    let target_key = sanitize_target_key(leaf);
    let run_id = derive_run_id(&safe_run_receipt.receipt_digest);
    let cs = &safe_run_receipt.content_summary;

    let run_receipt = RunReceipt {
        result: safe_run_receipt.execution.result,
        exit_code: exit_code.as_i32(),
        reason_codes: sort_unique(
            branch
                .execution_reason_codes
                .iter()
                .cloned()
                .chain(std::iter::once(safe_run_receipt.top_reason_code.clone()))
                .collect(),
        ),
        artifact_digest: safe_run_receipt.input_digest.clone().unwrap_or_default(),
        policy_digest: policy_id.to_string(),
        external_ref_count: cs.external_refs.count,
        unique_domain_count: cs.external_refs.top_domains.len() as u64,
        target_kind: cs.target_kind.clone(),
        artifact_kind: cs.artifact_kind.clone(),
        total_files: cs.total_files,
        total_bytes_bounded: cs.total_bytes_bounded,
        file_counts_by_kind: cs.file_counts_by_kind.clone(),
        has_scripts: cs.has_scripts,
        has_native_binaries: cs.has_native_binaries,
        url_like_count: cs.strings_indicators.url_like_count,
        signature_present: matches!(&safe_run_receipt.adapter, Some(a) if a.adapter_id == "signature"),
        timestamp_present: false,
        archive_depth_max: cs.archive_depth_max,
        nested_archive_count: cs.nested_archive_count,
        boundedness_markers: cs.boundedness_markers.clone(),
        cap_counters: std::collections::BTreeMap::new(),
        denied_caps: branch.denied_caps.clone(),
        host_release_status: safe_run_receipt.host_self_status,
        strict_verify: branch.host_receipt_digest.is_some(),
        strict_execute: branch.host_receipt_digest.is_some(),
    };

    let facts = RunLibraryFacts {
        privacy_fail: privacy_verdict == PrivacyLintVerdict::Fail,
        host_self_status: safe_run_receipt.host_self_status,
        host_self_reason_codes: safe_run_receipt.host_self_reason_codes.clone().unwrap_or_default(),
    };

    if let Err(e) = update_view_after_run(&library_root, &target_key, &run_id, &run_receipt, &facts) {
        tracing::warn!(error = %e, "library view update failed; safe-run result is unaffected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_adapters::AdapterSelection;
    use weftend_policy::Profile;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    fn with_library_root<T>(f: impl FnOnce() -> T) -> T {
        let lib_dir = TempDir::new().unwrap();
        std::env::set_var("WEFTEND_LIBRARY_ROOT", utf8(lib_dir.path()).as_str());
        let result = f();
        std::env::remove_var("WEFTEND_LIBRARY_ROOT");
        result
    }

    fn base_request(input: Utf8PathBuf, out: Utf8PathBuf) -> SafeRunRequest {
        SafeRunRequest {
            input_path: input,
            out_dir: out,
            policy_path: None,
            profile: Profile::Generic,
            execute_requested: false,
            withhold_exec: false,
            adapter: AdapterSelection::None,
            enabled_plugins: vec![],
            script_path: None,
        }
    }

    #[test]
    fn plain_text_run_allows_without_execution() {
        with_library_root(|| {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("input.txt"), b"hello world").unwrap();
            let req = base_request(
                utf8(dir.path()).join("input.txt"),
                utf8(dir.path()).join("out"),
            );
            let outcome = safe_run(&req).unwrap();
            assert_eq!(outcome.exit_code, ExitCode::SUCCESS);
            assert_eq!(outcome.safe_run_receipt.analysis_verdict, AnalysisVerdict::Allow);
            assert_eq!(outcome.safe_run_receipt.execution_verdict, ExecutionVerdict::NotAttempted);
            assert!(utf8(dir.path()).join("out/safe_run_receipt.json").exists());
            assert!(utf8(dir.path()).join("out/operator_receipt.json").exists());
            assert!(utf8(dir.path()).join("out/weftend/README.txt").exists());
        });
    }

    #[test]
    fn missing_input_fails_closed_before_staging() {
        with_library_root(|| {
            let dir = TempDir::new().unwrap();
            let req = base_request(
                utf8(dir.path()).join("nope"),
                utf8(dir.path()).join("out"),
            );
            let err = safe_run(&req).unwrap_err();
            assert_eq!(err.reason_code(), Some("INPUT_MISSING"));
            assert!(!utf8(dir.path()).join("out").exists());
        });
    }

    #[test]
    fn release_dir_missing_metadata_denies() {
        with_library_root(|| {
            let dir = TempDir::new().unwrap();
            let release = dir.path().join("release");
            fs::create_dir_all(&release).unwrap();
            fs::write(release.join("release_manifest.json"), b"{}").unwrap();
            fs::write(release.join("runtime_bundle.json"), b"{}").unwrap();
            let req = base_request(utf8(&release), utf8(dir.path()).join("out"));
            let outcome = safe_run(&req).unwrap();
            assert_eq!(outcome.exit_code, ExitCode::FAIL_CLOSED);
            assert_eq!(outcome.safe_run_receipt.analysis_verdict, AnalysisVerdict::Deny);
            assert_eq!(outcome.safe_run_receipt.top_reason_code, "EVIDENCE_MISSING");
        });
    }
}
