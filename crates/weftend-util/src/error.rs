//! Library-level error taxonomy and exit-code mapping (§7).
//!
//! Grounded on the teacher's split between a `thiserror`-derived library error
//! type and a small `ExitCode` newtype: library code returns `Result<_,
//! WeftEndError>` and never exits the process; only the CLI binary maps a
//! terminal error to `std::process::exit`.

use thiserror::Error;

/// Stable process exit codes (§6: `0` success, `40` fail-closed, `1` internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAIL_CLOSED: ExitCode = ExitCode(40);
    pub const INTERNAL: ExitCode = ExitCode(1);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

/// Library-level error type, organized by the taxonomy in §7.
#[derive(Error, Debug)]
pub enum WeftEndError {
    /// Input errors: missing/unreadable path, out-path conflict, unsupported flags.
    #[error("[{code}] {message}")]
    Input { code: String, message: String },

    /// Policy errors: `POLICY_MISSING`, `POLICY_INVALID`.
    #[error("[{code}] {message}")]
    Policy { code: String, message: String },

    /// Normalized-artifact errors: `ADAPTER_NORMALIZATION_INVALID`.
    #[error("[{code}] {message}")]
    NormalizedArtifact { code: String, message: String },

    /// Adapter format errors: `<CLASS>_FORMAT_MISMATCH`, `<CLASS>_PLUGIN_REQUIRED`, etc.
    #[error("[{code}] {message}")]
    Adapter { code: String, message: String },

    /// Release errors: `RELEASE_MANIFEST_*`, `RUNTIME_BUNDLE_*`, `EVIDENCE_*`, etc.
    #[error("[{code}] {message}")]
    Release { code: String, message: String },

    /// Library errors: best-effort; never changes the safe-run exit code.
    #[error("[{code}] {message}")]
    Library { code: String, message: String },

    /// Internal: receipt self-validation failure. Must be unreachable in practice.
    #[error("internal error: {0}")]
    Internal(String),

    /// Passthrough for lower-level I/O or (de)serialization failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WeftEndError {
    #[must_use]
    pub fn input(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn policy(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Policy {
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn adapter(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn release(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Release {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The reason code carried by this error, when it has one (all variants
    /// except `Internal`/`Other`).
    #[must_use]
    pub fn reason_code(&self) -> Option<&str> {
        match self {
            Self::Input { code, .. }
            | Self::Policy { code, .. }
            | Self::NormalizedArtifact { code, .. }
            | Self::Adapter { code, .. }
            | Self::Release { code, .. }
            | Self::Library { code, .. } => Some(code),
            Self::Internal(_) | Self::Other(_) => None,
        }
    }

    /// Map this error to its documented exit code (§6, §7).
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Input { .. }
            | Self::Policy { .. }
            | Self::NormalizedArtifact { .. }
            | Self::Adapter { .. }
            | Self::Release { .. } => ExitCode::FAIL_CLOSED,
            Self::Library { .. } => ExitCode::SUCCESS,
            Self::Internal(_) | Self::Other(_) => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_error_maps_to_fail_closed() {
        let err = WeftEndError::input("INPUT_MISSING", "input path does not exist");
        assert_eq!(err.to_exit_code(), ExitCode::FAIL_CLOSED);
        assert_eq!(err.reason_code(), Some("INPUT_MISSING"));
    }

    #[test]
    fn library_error_does_not_affect_exit_code() {
        let err = WeftEndError::Library {
            code: "LIBRARY_VIEWSTATE_WRITE_FAILED".into(),
            message: "disk full".into(),
        };
        assert_eq!(err.to_exit_code(), ExitCode::SUCCESS);
    }

    #[test]
    fn internal_error_maps_to_internal_exit_code() {
        let err = WeftEndError::Internal("receipt self-check failed".into());
        assert_eq!(err.to_exit_code(), ExitCode::INTERNAL);
        assert_eq!(err.reason_code(), None);
    }
}
