//! Canonical JSON encoding and content digests (§4.1).
//!
//! Canonicalization is delegated to `serde_json_canonicalizer`, which implements
//! JCS (RFC 8785): object keys sorted by byte-wise comparison of their UTF-16
//! code-unit sequences, no insignificant whitespace, minimal string escaping,
//! and no non-finite numbers. That is exactly the ordering the distilled spec
//! calls for, so no bespoke serializer is written here.

use anyhow::{Context, Result};
use serde::Serialize;

/// The single digest algorithm used across the build (§4.1: "a single algorithm
/// is used globally within a build").
pub const DIGEST_ALGO: &str = "blake3";

/// Canonicalization backend identifier, echoed into `weftendBuild` so receipts
/// are self-identifying.
pub const CANONICALIZATION_BACKEND: &str = "jcs-rfc8785";

/// Serialize `value` to canonical (JCS) JSON bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json_value =
        serde_json::to_value(value).with_context(|| "failed to serialize value to JSON")?;
    serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "failed to canonicalize JSON via JCS")
}

/// Serialize `value` to a canonical (JCS) JSON string.
pub fn canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    String::from_utf8(bytes).with_context(|| "canonical JSON output was not valid UTF-8")
}

/// Digest raw bytes, returning an algorithm-prefixed lower-case hex string.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    format!("{DIGEST_ALGO}:{}", hash.to_hex())
}

/// Canonicalize `value` and digest the canonical byte stream (§4.1).
pub fn digest_canonical<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    Ok(digest_bytes(&bytes))
}

/// Digest the contents of a file on disk.
pub fn digest_file(path: &camino::Utf8Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read file: {path}"))?;
    Ok(digest_bytes(&bytes))
}

/// The canonical byte-lexicographic string comparator used by every
/// "sort-unique" operation in the spec (§4.1: "Canonical ordering is one
/// function"). Rust's default `Ord` for `String`/`&str` already compares by
/// UTF-8 byte value, which agrees with JCS's UTF-16-code-unit ordering for the
/// ASCII-dominated identifiers this system sorts (reason codes, paths, bucket
/// names), so this is a thin named wrapper rather than a reimplementation.
#[must_use]
pub fn canonical_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Sort a vector of strings and remove duplicates using the canonical comparator.
pub fn sort_unique(mut items: Vec<String>) -> Vec<String> {
    items.sort_by(|a, b| canonical_cmp(a, b));
    items.dedup();
    items
}

/// Sentinel appended to a sort-unique, length-bounded list when elements were
/// dropped (§3 `CompareReceipt.changes[].added/removed`, §4.10).
pub fn truncated_sentinel(dropped: usize) -> String {
    format!("ZZZ_TRUNCATED(+{dropped})")
}

/// Sort-unique a list and bound it to `limit` elements, appending a truncation
/// sentinel carrying the dropped count when truncation occurred.
pub fn sort_unique_bounded(items: Vec<String>, limit: usize) -> Vec<String> {
    let mut sorted = sort_unique(items);
    if sorted.len() > limit {
        let dropped = sorted.len() - limit;
        sorted.truncate(limit);
        sorted.push(truncated_sentinel(dropped));
    }
    sorted
}
