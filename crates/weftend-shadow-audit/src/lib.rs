//! Shadow-audit: a deterministic, proof-only reducer over a bounded event
//! stream (§4.11). Grounded on the teacher's `xchecker-gate` ordered rule
//! walk: every violation carries a reason code, no raw input is echoed back.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use weftend_receipt::{
    ShadowAuditCapCounts, ShadowAuditCapTally, ShadowAuditResult, ShadowAuditSequenceCounts,
    ShadowAuditStatus,
};
use weftend_util::canon::sort_unique_bounded;

pub const MAX_EVENTS: usize = 512;
pub const MAX_EVENT_KEYS: usize = 32;
pub const MAX_STRING_BYTES: usize = 64;
pub const MAX_REASON_FAMILIES: usize = 32;
pub const MAX_TARTARUS_KINDS: usize = 32;

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:-]{1,64}$").unwrap());
static DOMAIN_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9-]+\.[A-Za-z]{2,}").unwrap());
static DRIVE_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]:[\\/]").unwrap());

const FORBIDDEN_KEYS: &[&str] = &[
    "userId",
    "deviceId",
    "timestampMs",
    "path",
    "url",
    "ip",
    "email",
    "hostname",
];

const HOST_LIKE_KEY_HINTS: &[&str] = &["host", "url", "domain"];

/// A shadow-audit request: the deny thresholds from policy plus one flat,
/// order-independent event array (§4.11 property: shuffle-invariance).
#[derive(Debug, Clone)]
pub struct ShadowAuditRequest {
    pub deny_thresholds: BTreeMap<String, u64>,
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
struct Violations {
    schema_invalid: bool,
    privacy_forbidden: bool,
    bounds_exceeded: bool,
}

struct ValidEvent {
    seq: u64,
    side: Side,
    kind: String,
    cap_id: Option<String>,
    evidence_ok: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Expected,
    Observed,
}

/// Reduce `request` to a proof-only `ShadowAuditResult` (§4.11). The result
/// never contains the input events, by construction of the return type.
#[must_use]
pub fn run_shadow_audit(request: &ShadowAuditRequest) -> ShadowAuditResult {
    let mut violations = Violations::default();

    if request.events.len() > MAX_EVENTS {
        violations.bounds_exceeded = true;
    }

    let mut valid_events = Vec::new();
    let mut kind_counts: BTreeMap<String, u64> = BTreeMap::new();

    for raw in &request.events {
        match validate_event(raw) {
            Ok(event) => {
                *kind_counts.entry(event.kind.clone()).or_insert(0) += 1;
                if kind_counts.len() > MAX_TARTARUS_KINDS {
                    violations.bounds_exceeded = true;
                } else {
                    valid_events.push(event);
                }
            }
            Err(EventError::Schema) => violations.schema_invalid = true,
            Err(EventError::Privacy) => violations.privacy_forbidden = true,
        }
    }

    let sequence_counts = compute_sequence_counts(&valid_events);
    let cap_counts = compute_cap_counts(&valid_events);

    let mut reason_families = Vec::new();
    if violations.schema_invalid {
        reason_families.push("SHADOW_AUDIT_SCHEMA_INVALID".to_string());
    }
    if violations.privacy_forbidden {
        reason_families.push("SHADOW_AUDIT_PRIVACY_FORBIDDEN".to_string());
    }
    if violations.bounds_exceeded {
        reason_families.push("SHADOW_AUDIT_BOUNDS_EXCEEDED".to_string());
    }
    if sequence_counts.missing > 0 {
        reason_families.push("SEQ_MISSING".to_string());
    }
    if sequence_counts.extra > 0 {
        reason_families.push("SEQ_EXTRA".to_string());
    }
    if sequence_counts.reordered > 0 {
        reason_families.push("SEQ_REORDERED".to_string());
    }
    if sequence_counts.duplicate > 0 {
        reason_families.push("SEQ_DUPLICATE".to_string());
    }
    if cap_counts.attempted_without_request > 0 {
        reason_families.push("CAP_ATTEMPTED_WITHOUT_REQUEST".to_string());
    }
    if cap_counts.allowed_without_evidence > 0 {
        reason_families.push("CAP_ALLOWED_WITHOUT_EVIDENCE".to_string());
    }
    if cap_counts.inconsistent > 0 {
        reason_families.push("CAP_INCONSISTENT".to_string());
    }

    let threshold_breach = reason_families.iter().any(|family| {
        request
            .deny_thresholds
            .get(family)
            .is_some_and(|limit| family_counter(family, &sequence_counts, &cap_counts) > *limit)
    });

    let hard_deny = violations.schema_invalid || violations.privacy_forbidden || violations.bounds_exceeded;
    let status = if hard_deny || threshold_breach {
        ShadowAuditStatus::Deny
    } else if !reason_families.is_empty() {
        ShadowAuditStatus::Warn
    } else {
        ShadowAuditStatus::Ok
    };

    let mut counts = BTreeMap::new();
    counts.insert("totalEvents".to_string(), request.events.len() as u64);
    counts.insert("validEvents".to_string(), valid_events.len() as u64);
    counts.insert(
        "expectedCount".to_string(),
        valid_events.iter().filter(|e| e.side == Side::Expected).count() as u64,
    );
    counts.insert(
        "observedCount".to_string(),
        valid_events.iter().filter(|e| e.side == Side::Observed).count() as u64,
    );

    ShadowAuditResult {
        schema: ShadowAuditResult::SCHEMA.to_string(),
        v: 0,
        status,
        reason_families: sort_unique_bounded(reason_families, MAX_REASON_FAMILIES),
        tartarus_kind_counts: kind_counts,
        counts,
        sequence_counts,
        cap_counts,
    }
}

fn family_counter(
    family: &str,
    sequence_counts: &ShadowAuditSequenceCounts,
    cap_counts: &ShadowAuditCapCounts,
) -> u64 {
    match family {
        "SEQ_MISSING" => sequence_counts.missing,
        "SEQ_EXTRA" => sequence_counts.extra,
        "SEQ_REORDERED" => sequence_counts.reordered,
        "SEQ_DUPLICATE" => sequence_counts.duplicate,
        "CAP_ATTEMPTED_WITHOUT_REQUEST" => cap_counts.attempted_without_request,
        "CAP_ALLOWED_WITHOUT_EVIDENCE" => cap_counts.allowed_without_evidence,
        "CAP_INCONSISTENT" => cap_counts.inconsistent,
        _ => 0,
    }
}

enum EventError {
    Schema,
    Privacy,
}

fn validate_event(raw: &serde_json::Value) -> Result<ValidEvent, EventError> {
    let obj = raw.as_object().ok_or(EventError::Schema)?;
    if obj.len() > MAX_EVENT_KEYS {
        return Err(EventError::Schema);
    }

    for (key, value) in obj {
        if !KEY_PATTERN.is_match(key) {
            return Err(EventError::Schema);
        }
        if FORBIDDEN_KEYS.contains(&key.as_str()) {
            return Err(EventError::Privacy);
        }
        validate_value(key, value)?;
    }

    let seq = obj.get("seq").and_then(serde_json::Value::as_u64).ok_or(EventError::Schema)?;
    let side = match obj.get("side").and_then(|v| v.as_str()) {
        Some("expected") => Side::Expected,
        Some("observed") => Side::Observed,
        _ => return Err(EventError::Schema),
    };
    let kind = obj
        .get("kind")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(EventError::Schema)?
        .to_string();
    let cap_id = obj.get("capId").and_then(|v| v.as_str()).map(str::to_string);
    let evidence_ok = obj.get("evidenceOk").and_then(serde_json::Value::as_bool).unwrap_or(false);

    Ok(ValidEvent {
        seq,
        side,
        kind,
        cap_id,
        evidence_ok,
    })
}

fn validate_value(key: &str, value: &serde_json::Value) -> Result<(), EventError> {
    match value {
        serde_json::Value::Bool(_) => Ok(()),
        serde_json::Value::Number(n) => {
            if n.as_f64().is_some_and(f64::is_finite) {
                Ok(())
            } else {
                Err(EventError::Schema)
            }
        }
        serde_json::Value::String(s) => validate_string(key, s),
        serde_json::Value::Array(items) => {
            if key != "reasonCodes" {
                return Err(EventError::Schema);
            }
            for item in items {
                match item {
                    serde_json::Value::String(s) => validate_string(key, s)?,
                    _ => return Err(EventError::Schema),
                }
            }
            Ok(())
        }
        _ => Err(EventError::Schema),
    }
}

fn validate_string(key: &str, s: &str) -> Result<(), EventError> {
    if s.len() > MAX_STRING_BYTES {
        return Err(EventError::Schema);
    }
    if s.contains("://") || s.starts_with('/') || DRIVE_LETTER.is_match(s) {
        return Err(EventError::Privacy);
    }
    let key_implies_host = HOST_LIKE_KEY_HINTS.iter().any(|hint| key.to_lowercase().contains(hint));
    if key_implies_host && DOMAIN_LIKE.is_match(s) {
        return Err(EventError::Privacy);
    }
    Ok(())
}

fn compute_sequence_counts(events: &[ValidEvent]) -> ShadowAuditSequenceCounts {
    let mut expected_kinds: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    let mut observed_kinds: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    let mut side_seq_multiplicity: BTreeMap<(Side, u64), u64> = BTreeMap::new();

    for event in events {
        let bucket = match event.side {
            Side::Expected => &mut expected_kinds,
            Side::Observed => &mut observed_kinds,
        };
        bucket.entry(event.seq).or_default().push(event.kind.clone());
        *side_seq_multiplicity.entry((event.side, event.seq)).or_insert(0) += 1;
    }
    for kinds in expected_kinds.values_mut().chain(observed_kinds.values_mut()) {
        kinds.sort();
    }

    let expected_seqs: BTreeSet<u64> = expected_kinds.keys().copied().collect();
    let observed_seqs: BTreeSet<u64> = observed_kinds.keys().copied().collect();

    let missing = expected_seqs.difference(&observed_seqs).count() as u64;
    let extra = observed_seqs.difference(&expected_seqs).count() as u64;
    let reordered = expected_seqs
        .intersection(&observed_seqs)
        .filter(|seq| expected_kinds.get(seq) != observed_kinds.get(seq))
        .count() as u64;
    let duplicate = side_seq_multiplicity
        .values()
        .filter(|count| **count > 1)
        .map(|count| count - 1)
        .sum();

    ShadowAuditSequenceCounts {
        missing,
        extra,
        reordered,
        duplicate,
    }
}

fn compute_cap_counts(events: &[ValidEvent]) -> ShadowAuditCapCounts {
    let mut per_cap: BTreeMap<String, ShadowAuditCapTally> = BTreeMap::new();
    let mut attempted_without_request = 0u64;
    let mut allowed_without_evidence = 0u64;

    for event in events.iter().filter(|e| e.side == Side::Observed) {
        let Some(cap_id) = &event.cap_id else {
            continue;
        };
        let tally = per_cap.entry(cap_id.clone()).or_default();
        match event.kind.as_str() {
            "REQUEST" => tally.requests += 1,
            "ALLOW" => {
                tally.allows += 1;
                if !event.evidence_ok {
                    allowed_without_evidence += 1;
                }
            }
            "DENY" => tally.denies += 1,
            _ => {}
        }
    }

    for event in events.iter().filter(|e| e.side == Side::Observed) {
        let Some(cap_id) = &event.cap_id else {
            continue;
        };
        if matches!(event.kind.as_str(), "ALLOW" | "DENY") {
            let tally = &per_cap[cap_id];
            if tally.requests == 0 {
                attempted_without_request += 1;
            }
        }
    }

    let inconsistent = per_cap
        .values()
        .filter(|tally| tally.allows > 0 && tally.denies > 0)
        .count() as u64;

    ShadowAuditCapCounts {
        attempted_without_request,
        allowed_without_evidence,
        inconsistent,
        per_cap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(events: Vec<serde_json::Value>) -> ShadowAuditRequest {
        ShadowAuditRequest {
            deny_thresholds: BTreeMap::new(),
            events,
        }
    }

    #[test]
    fn clean_matched_stream_is_ok() {
        let events = vec![
            json!({"seq": 1, "side": "expected", "kind": "REQUEST"}),
            json!({"seq": 1, "side": "observed", "kind": "REQUEST"}),
        ];
        let result = run_shadow_audit(&request(events));
        assert_eq!(result.status, ShadowAuditStatus::Ok);
        assert_eq!(result.sequence_counts.missing, 0);
    }

    #[test]
    fn missing_observed_seq_is_warn() {
        let events = vec![json!({"seq": 1, "side": "expected", "kind": "REQUEST"})];
        let result = run_shadow_audit(&request(events));
        assert_eq!(result.sequence_counts.missing, 1);
        assert_eq!(result.status, ShadowAuditStatus::Warn);
    }

    #[test]
    fn forbidden_key_denies() {
        let events = vec![json!({"seq": 1, "side": "observed", "kind": "REQUEST", "userId": "abc"})];
        let result = run_shadow_audit(&request(events));
        assert_eq!(result.status, ShadowAuditStatus::Deny);
        assert!(result.reason_families.contains(&"SHADOW_AUDIT_PRIVACY_FORBIDDEN".to_string()));
    }

    #[test]
    fn allow_without_request_is_attempted_without_request() {
        let events = vec![json!({"seq": 1, "side": "observed", "kind": "ALLOW", "capId": "net", "evidenceOk": true})];
        let result = run_shadow_audit(&request(events));
        assert_eq!(result.cap_counts.attempted_without_request, 1);
    }

    #[test]
    fn allow_and_deny_same_cap_is_inconsistent() {
        let events = vec![
            json!({"seq": 1, "side": "observed", "kind": "REQUEST", "capId": "net"}),
            json!({"seq": 2, "side": "observed", "kind": "ALLOW", "capId": "net", "evidenceOk": true}),
            json!({"seq": 3, "side": "observed", "kind": "DENY", "capId": "net"}),
        ];
        let result = run_shadow_audit(&request(events));
        assert_eq!(result.cap_counts.inconsistent, 1);
    }

    #[test]
    fn shuffled_events_yield_identical_result() {
        let events = vec![
            json!({"seq": 1, "side": "expected", "kind": "REQUEST"}),
            json!({"seq": 2, "side": "observed", "kind": "ALLOW", "capId": "net", "evidenceOk": true}),
            json!({"seq": 2, "side": "expected", "kind": "ALLOW"}),
        ];
        let mut shuffled = events.clone();
        shuffled.reverse();
        let a = run_shadow_audit(&request(events));
        let b = run_shadow_audit(&request(shuffled));
        assert_eq!(a.sequence_counts.missing, b.sequence_counts.missing);
        assert_eq!(a.cap_counts.inconsistent, b.cap_counts.inconsistent);
        assert_eq!(a.status, b.status);
    }
}
