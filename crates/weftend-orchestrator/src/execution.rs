//! Execution gating table (§4.5.c, "Execution reason taxonomy").

use weftend_classify::ArtifactKind;
use weftend_mint::IntakeAction;
use weftend_receipt::{ExecResult, ExecutionVerdict};

/// The outcome of evaluating the execution gating table: whether a host run
/// should be attempted, and the reason codes to attach either way.
pub struct ExecutionGate {
    pub verdict: ExecutionVerdict,
    pub reason_codes: Vec<String>,
    pub should_attempt: bool,
}

impl ExecutionGate {
    /// The `ExecResult` recorded on `ExecutionDetail`/`RunReceipt`, which has
    /// no `NOT_ATTEMPTED` variant of its own; it collapses into `SKIP`.
    #[must_use]
    pub fn exec_result(&self) -> ExecResult {
        match self.verdict {
            ExecutionVerdict::Allow => ExecResult::Allow,
            ExecutionVerdict::Deny => ExecResult::Deny,
            ExecutionVerdict::Skip | ExecutionVerdict::NotAttempted => ExecResult::Skip,
        }
    }
}

/// Evaluate the fixed-order execution gating table against one raw-branch
/// run. Order matters: the first matching row wins.
#[must_use]
pub fn gate_execution(
    withhold_exec: bool,
    execute_requested: bool,
    intake_action: IntakeAction,
    kind: ArtifactKind,
) -> ExecutionGate {
    if withhold_exec {
        return ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec!["SAFE_RUN_WITHHOLD_EXEC_REQUESTED".to_string()],
            should_attempt: false,
        };
    }
    if !execute_requested {
        return ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec!["SAFE_RUN_EXECUTION_NOT_REQUESTED".to_string()],
            should_attempt: false,
        };
    }
    if intake_action != IntakeAction::Approve {
        return ExecutionGate {
            verdict: ExecutionVerdict::Skip,
            reason_codes: vec!["INTAKE_NOT_APPROVED".to_string()],
            should_attempt: false,
        };
    }
    match kind {
        ArtifactKind::NativeExe | ArtifactKind::NativeMsi => ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec![
                "ARTIFACT_NATIVE_BINARY_WITHHELD".to_string(),
                "EXECUTION_WITHHELD_UNSUPPORTED_ARTIFACT".to_string(),
            ],
            should_attempt: false,
        },
        ArtifactKind::ShortcutLnk => ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec![
                "ARTIFACT_SHORTCUT_UNSUPPORTED".to_string(),
                "EXECUTION_WITHHELD_UNSUPPORTED_ARTIFACT".to_string(),
            ],
            should_attempt: false,
        },
        ArtifactKind::Unknown => ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec![
                "SAFE_RUN_NO_ENTRYPOINT_FOUND".to_string(),
                "ANALYSIS_ONLY_UNKNOWN_ARTIFACT".to_string(),
            ],
            should_attempt: false,
        },
        ArtifactKind::Zip | ArtifactKind::Text | ArtifactKind::ReleaseDir => ExecutionGate {
            verdict: ExecutionVerdict::NotAttempted,
            reason_codes: vec!["ANALYSIS_ONLY_NO_EXECUTION_LANE".to_string()],
            should_attempt: false,
        },
        ArtifactKind::ContainerImage => ExecutionGate {
            verdict: ExecutionVerdict::Allow,
            reason_codes: vec![],
            should_attempt: true,
        },
    }
}
