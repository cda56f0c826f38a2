//! External collaborator trait seams and their deterministic local stand-ins
//! (§6 "External collaborators"): `examineArtifact`, `buildIntakeDecision`,
//! `hostRunStrict`. Grounded on the teacher's `xchecker-gate` policy
//! evaluator: a small trait at the seam, an ordered rule walk inside the
//! default implementation, and every decision carrying its reason codes
//! rather than an opaque score.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use weftend_capture::{capture, ArtifactCapture, CaptureLimits};
use weftend_classify::{classify, ArtifactKind};
use weftend_policy::WeftEndPolicy;
use weftend_util::canon::digest_canonical;
use weftend_util::error::WeftEndError;

/// A single mint observation (§3 `MintPackage`: "script-like hints, external
/// refs, structural markers, sizes").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub kind: String,
    pub detail: String,
}

/// `{inputDigests, observations, mint digest}` (§3 `MintPackage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintPackage {
    pub input_digest: String,
    pub observations: Vec<Observation>,
    pub mint_digest: String,
    pub root_digest: String,
}

/// `examineArtifact(path, {profile, scriptText?}) -> {mint, capture, report}` (§6).
#[derive(Debug, Clone)]
pub struct ExaminationOutcome {
    pub mint: MintPackage,
    pub capture: ArtifactCapture,
    pub classifier_kind: ArtifactKind,
    pub report: String,
}

pub trait ArtifactExaminer {
    fn examine_artifact(
        &self,
        path: &Utf8Path,
        script_text: Option<&str>,
    ) -> Result<ExaminationOutcome, WeftEndError>;
}

const SCRIPT_EXTENSIONS: &[&str] = &["js", "ps1", "sh", "bat", "vbs", "py"];

/// Deterministic local stand-in for `examineArtifact`: captures the tree,
/// classifies it, and derives observations purely from structural signals
/// already present in the capture (no network, no execution).
#[derive(Debug, Default)]
pub struct LocalExaminer {
    pub limits: CaptureLimits,
}

impl ArtifactExaminer for LocalExaminer {
    fn examine_artifact(
        &self,
        path: &Utf8Path,
        script_text: Option<&str>,
    ) -> Result<ExaminationOutcome, WeftEndError> {
        let captured = capture(path, self.limits)?;
        let classification = classify(path, &captured);

        let mut observations = Vec::new();
        for entry in &captured.entries {
            if let Some(ext) = entry.path.rsplit('.').next() {
                if SCRIPT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    observations.push(Observation {
                        kind: "SCRIPT_LIKE".to_string(),
                        detail: entry.path.clone(),
                    });
                }
            }
        }
        if let Some(hint) = &classification.entry_hint {
            observations.push(Observation {
                kind: "STRUCTURAL_MARKER".to_string(),
                detail: hint.clone(),
            });
        }
        if script_text.is_some() {
            observations.push(Observation {
                kind: "SCRIPT_LIKE".to_string(),
                detail: "inline_script_text".to_string(),
            });
        }
        observations.sort();
        observations.dedup();

        let input_digest = captured.root_digest.clone();
        let mint_digest = digest_canonical(&observations)
            .map_err(|e| WeftEndError::Internal(format!("mint digest failed: {e}")))?;

        let report = format!(
            "examined {} entries, kind={}, observations={}",
            captured.entries.len(),
            classification.kind.as_str(),
            observations.len()
        );

        Ok(ExaminationOutcome {
            mint: MintPackage {
                input_digest,
                observations,
                mint_digest,
                root_digest: captured.root_digest.clone(),
            },
            capture: captured,
            classifier_kind: classification.kind,
            report,
        })
    }
}

/// `{action}` (§6 intake decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntakeAction {
    Approve,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeDecision {
    pub action: IntakeAction,
    pub top_reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppealBundle {
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub decision: IntakeDecision,
    pub disclosure: String,
    pub appeal: AppealBundle,
}

pub trait IntakeDecisionMaker {
    fn build_intake_decision(
        &self,
        mint: &MintPackage,
        policy: &WeftEndPolicy,
    ) -> Result<IntakeOutcome, WeftEndError>;
}

/// Deterministic local stand-in for `buildIntakeDecision`: denies only when
/// the policy's `intake` rule explicitly denies `"script"` and the mint
/// carries a `SCRIPT_LIKE` observation; approves otherwise.
#[derive(Debug, Default)]
pub struct LocalIntakeDecisionMaker;

impl IntakeDecisionMaker for LocalIntakeDecisionMaker {
    fn build_intake_decision(
        &self,
        mint: &MintPackage,
        policy: &WeftEndPolicy,
    ) -> Result<IntakeOutcome, WeftEndError> {
        let has_script = mint.observations.iter().any(|o| o.kind == "SCRIPT_LIKE");
        let intake_denies_script = policy
            .rules
            .get("intake")
            .is_some_and(|rule| rule.deny.iter().any(|d| d == "script"));

        let (action, top_reasons) = if has_script && intake_denies_script {
            (
                IntakeAction::Deny,
                vec!["INTAKE_NOT_APPROVED".to_string()],
            )
        } else {
            (IntakeAction::Approve, Vec::new())
        };

        let disclosure = format!(
            "intake decision: {} ({} observation(s) considered)",
            match action {
                IntakeAction::Approve => "APPROVE",
                IntakeAction::Deny => "DENY",
            },
            mint.observations.len()
        );

        Ok(IntakeOutcome {
            decision: IntakeDecision {
                action,
                top_reasons,
            },
            disclosure,
            appeal: AppealBundle {
                summary: "no appeal filed; decision is deterministic and local".to_string(),
            },
        })
    }
}

/// `hostRunStrict({releaseDir, outDir}) -> {receipt}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRunReceipt {
    pub status: String,
    pub reason_codes: Vec<String>,
    pub digest: String,
}

pub trait HostRunner {
    fn host_run_strict(
        &self,
        release_dir: &Utf8Path,
        out_dir: &Utf8Path,
    ) -> Result<HostRunReceipt, WeftEndError>;
}

/// Deterministic local stand-in: never actually executes anything; reports
/// `UNVERIFIED` so the execution lane remains honest about not having real
/// sandboxed execution available in this build.
#[derive(Debug, Default)]
pub struct LocalHostRunner;

impl HostRunner for LocalHostRunner {
    fn host_run_strict(
        &self,
        release_dir: &Utf8Path,
        out_dir: &Utf8Path,
    ) -> Result<HostRunReceipt, WeftEndError> {
        if !release_dir.exists() {
            return Err(WeftEndError::release(
                "RUNTIME_BUNDLE_MISSING",
                format!("release directory missing: {release_dir}"),
            ));
        }
        std::fs::create_dir_all(out_dir.as_std_path())
            .map_err(|e| WeftEndError::Internal(format!("failed to create {out_dir}: {e}")))?;
        let digest = digest_canonical(&release_dir.to_string())
            .map_err(|e| WeftEndError::Internal(format!("host receipt digest failed: {e}")))?;
        Ok(HostRunReceipt {
            status: "UNVERIFIED".to_string(),
            reason_codes: vec!["HOST_RUN_NOT_SANDBOXED".to_string()],
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use weftend_policy::{default_policy, PolicyRule};

    fn utf8(path: &std::path::Path) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn examiner_flags_script_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("install.sh"), b"#!/bin/sh\necho hi").unwrap();
        let examiner = LocalExaminer::default();
        let outcome = examiner.examine_artifact(&utf8(dir.path()), None).unwrap();
        assert!(outcome
            .mint
            .observations
            .iter()
            .any(|o| o.kind == "SCRIPT_LIKE"));
    }

    #[test]
    fn intake_approves_without_deny_rule() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("install.sh"), b"echo hi").unwrap();
        let examiner = LocalExaminer::default();
        let outcome = examiner.examine_artifact(&utf8(dir.path()), None).unwrap();

        let maker = LocalIntakeDecisionMaker;
        let policy = default_policy();
        let decision = maker.build_intake_decision(&outcome.mint, &policy).unwrap();
        assert_eq!(decision.decision.action, IntakeAction::Approve);
    }

    #[test]
    fn intake_denies_script_when_policy_forbids_it() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("install.sh"), b"echo hi").unwrap();
        let examiner = LocalExaminer::default();
        let outcome = examiner.examine_artifact(&utf8(dir.path()), None).unwrap();

        let maker = LocalIntakeDecisionMaker;
        let mut policy = default_policy();
        policy.rules.insert(
            "intake".to_string(),
            PolicyRule {
                allow: vec![],
                deny: vec!["script".to_string()],
            },
        );
        let decision = maker.build_intake_decision(&outcome.mint, &policy).unwrap();
        assert_eq!(decision.decision.action, IntakeAction::Deny);
    }

    #[test]
    fn host_runner_reports_unverified() {
        let release = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let runner = LocalHostRunner;
        let receipt = runner
            .host_run_strict(&utf8(release.path()), &utf8(out.path()).join("host"))
            .unwrap();
        assert_eq!(receipt.status, "UNVERIFIED");
    }
}
