//! Adapter outcome types (§3 `AdapterResult`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    Strict,
    Plugin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSignalsData {
    pub class: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `{ok:true, adapter:{adapterId, mode}, summary, findings, adapterSignals, reasonCodes}`
/// on success, `{ok:false, failCode, failMessage, reasonCodes}` on failure (§3).
#[derive(Debug, Clone)]
pub enum AdapterResult {
    Ok {
        adapter_id: String,
        mode: AdapterMode,
        summary: String,
        findings: Vec<String>,
        adapter_signals: Option<AdapterSignalsData>,
        reason_codes: Vec<String>,
    },
    Fail {
        fail_code: String,
        fail_message: String,
        reason_codes: Vec<String>,
    },
}

impl AdapterResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    #[must_use]
    pub fn fail_code(&self) -> Option<&str> {
        match self {
            Self::Fail { fail_code, .. } => Some(fail_code),
            Self::Ok { .. } => None,
        }
    }

    pub fn reason_codes(&self) -> &[String] {
        match self {
            Self::Ok { reason_codes, .. } | Self::Fail { reason_codes, .. } => reason_codes,
        }
    }
}
