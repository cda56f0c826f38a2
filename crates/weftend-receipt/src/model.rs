//! Receipt and content-summary schemas (§3).

use serde::{Deserialize, Serialize};

/// Self-identifying build metadata echoed into every receipt (§4.1: "the
/// selected algorithm and its digest appear in every receipt's `weftendBuild`
/// block, so receipts are self-identifying").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeftendBuild {
    pub digest_algo: String,
    pub canonicalization_backend: String,
    pub schema_version: u32,
}

impl Default for WeftendBuild {
    fn default() -> Self {
        Self {
            digest_algo: weftend_util::canon::DIGEST_ALGO.to_string(),
            canonicalization_backend: weftend_util::canon::CANONICALIZATION_BACKEND.to_string(),
            schema_version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Raw,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisVerdict {
    Allow,
    Deny,
    Withheld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionVerdict {
    Allow,
    Deny,
    Skip,
    #[serde(rename = "NOT_ATTEMPTED")]
    NotAttempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecResult {
    Allow,
    Deny,
    Skip,
    Withheld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostSelfStatus {
    Ok,
    Unverified,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterRef {
    pub adapter_id: String,
    pub mode: AdapterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    Strict,
    Plugin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCountsByKind {
    pub html: u64,
    pub js: u64,
    pub css: u64,
    pub json: u64,
    pub wasm: u64,
    pub media: u64,
    pub binary: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRefs {
    pub count: u64,
    pub top_domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringsIndicators {
    pub url_like_count: u64,
    pub ip_like_count: u64,
    pub powershell_like_count: u64,
    pub cmd_exec_like_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSignals {
    pub class: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMatch {
    pub selected_policy: String,
    pub reason_codes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashFamily {
    /// Field name is fixed by the data model; the value is this build's
    /// algorithm-prefixed content digest, not necessarily literal SHA-256.
    pub sha256: String,
}

/// Deterministic content summary derived from capture, classifier, and mint
/// observations (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub target_kind: String,
    pub artifact_kind: String,
    pub file_counts_by_kind: FileCountsByKind,
    pub total_files: u64,
    pub total_bytes_bounded: u64,
    pub top_extensions: Vec<String>,
    pub has_native_binaries: bool,
    pub has_scripts: bool,
    pub has_html: bool,
    pub external_refs: ExternalRefs,
    pub entry_hints: Vec<String>,
    pub boundedness_markers: Vec<String>,
    pub archive_depth_max: u32,
    pub nested_archive_count: u32,
    pub manifest_count: u32,
    pub strings_indicators: StringsIndicators,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_signals: Option<AdapterSignals>,
    pub policy_match: PolicyMatch,
    pub hash_family: HashFamily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubReceiptEntry {
    pub name: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetail {
    pub result: ExecResult,
    pub reason_codes: Vec<String>,
}

/// `{schema:"weftend.safeRunReceipt/0", ...}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeRunReceipt {
    pub schema: String,
    pub schema_version: u32,
    pub weftend_build: WeftendBuild,
    pub input_kind: InputKind,
    pub artifact_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hint: Option<String>,
    pub analysis_verdict: AnalysisVerdict,
    pub execution_verdict: ExecutionVerdict,
    pub top_reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
    pub policy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_dir_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_decision_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_receipt_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_self_status: Option<HostSelfStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_self_reason_codes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<AdapterRef>,
    pub content_summary: ContentSummary,
    pub execution: ExecutionDetail,
    pub sub_receipts: Vec<SubReceiptEntry>,
    pub receipt_digest: String,
}

impl SafeRunReceipt {
    pub const SCHEMA: &'static str = "weftend.safeRunReceipt/0";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorReceiptEntry {
    pub kind: String,
    pub rel_path: String,
    pub digest: String,
}

/// `{command, weftendBuild, schemaVersion, receipts:[...], warnings[], ...}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorReceipt {
    pub command: String,
    pub weftend_build: WeftendBuild,
    pub schema_version: u32,
    pub receipts: Vec<OperatorReceiptEntry>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_summary: Option<ContentSummary>,
    pub privacy_lint: PrivacyLintVerdict,
    pub receipt_digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompareVerdict {
    Same,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivacyLintVerdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareSide {
    pub summary_digest: String,
    pub receipt_kinds: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub bucket: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<ChangeCounts>,
}

/// `{schema:"weftend.compareReceipt/0", ...}` (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReceipt {
    pub schema: String,
    pub left: CompareSide,
    pub right: CompareSide,
    pub verdict: CompareVerdict,
    pub change_buckets: Vec<String>,
    pub changes: Vec<ChangeEntry>,
    pub privacy_lint: PrivacyLintVerdict,
    pub reason_codes: Vec<String>,
    pub receipt_digest: String,
}

impl CompareReceipt {
    pub const SCHEMA: &'static str = "weftend.compareReceipt/0";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedState {
    pub run_id: String,
    pub reason_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryViewKey {
    pub verdict_vs_baseline: CompareVerdict,
    pub buckets: Vec<String>,
    pub artifact_digest: String,
    pub result: ExecResult,
}

/// `{schemaVersion:0, targetKey, baselineRunId, latestRunId, blocked, lastN, keys}` (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryViewState {
    pub schema_version: u32,
    pub target_key: String,
    pub baseline_run_id: String,
    pub latest_run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockedState>,
    pub last_n: Vec<String>,
    pub keys: Vec<LibraryViewKey>,
}

/// Slim per-run projection persisted at `run_XXXXXX/run_receipt.json`, the
/// left/right input to the compare engine (§4.10 extension of §3; not
/// present in the distilled data model but required to make `left`/`right`
/// concrete).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReceipt {
    pub result: ExecResult,
    pub exit_code: i32,
    pub reason_codes: Vec<String>,
    pub artifact_digest: String,
    pub policy_digest: String,
    pub external_ref_count: u64,
    pub unique_domain_count: u64,
    pub target_kind: String,
    pub artifact_kind: String,
    pub total_files: u64,
    pub total_bytes_bounded: u64,
    pub file_counts_by_kind: FileCountsByKind,
    pub has_scripts: bool,
    pub has_native_binaries: bool,
    pub url_like_count: u64,
    pub signature_present: bool,
    pub timestamp_present: bool,
    pub archive_depth_max: u32,
    pub nested_archive_count: u32,
    pub boundedness_markers: Vec<String>,
    pub cap_counters: std::collections::BTreeMap<String, u64>,
    pub denied_caps: Vec<String>,
    pub host_release_status: Option<HostSelfStatus>,
    pub strict_verify: bool,
    pub strict_execute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShadowAuditStatus {
    Deny,
    Warn,
    Ok,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowAuditSequenceCounts {
    pub missing: u64,
    pub extra: u64,
    pub reordered: u64,
    pub duplicate: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowAuditCapCounts {
    pub attempted_without_request: u64,
    pub allowed_without_evidence: u64,
    pub inconsistent: u64,
    pub per_cap: std::collections::BTreeMap<String, ShadowAuditCapTally>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowAuditCapTally {
    pub requests: u64,
    pub allows: u64,
    pub denies: u64,
}

/// Proof-only shadow-audit output; MUST NOT echo `events`, `stream`, or
/// `request` (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowAuditResult {
    pub schema: String,
    pub v: u32,
    pub status: ShadowAuditStatus,
    pub reason_families: Vec<String>,
    pub tartarus_kind_counts: std::collections::BTreeMap<String, u64>,
    pub counts: std::collections::BTreeMap<String, u64>,
    pub sequence_counts: ShadowAuditSequenceCounts,
    pub cap_counts: ShadowAuditCapCounts,
}

impl ShadowAuditResult {
    pub const SCHEMA: &'static str = "weftend.shadowAuditResult/0";
}
