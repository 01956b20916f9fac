//! Canonical JSON (RFC 8785 / JCS) for batch documents.
//!
//! The canonical form is what `content_hash` is computed over, so it must
//! not depend on map iteration order or on how a record was constructed:
//! keys are sorted, whitespace is dropped and numbers are normalized.

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize a value to canonical JSON bytes.
///
/// # Example
///
/// ```
/// use inscribe_core::crypto::jcs;
/// use serde_json::json;
///
/// let bytes = jcs::to_vec(&json!({"name": "Tarot", "id": "tarot"})).unwrap();
/// assert_eq!(bytes, br#"{"id":"tarot","name":"Tarot"}"#);
/// ```
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value).context("failed to serialize canonical json")
}

/// Re-canonicalize raw JSON bytes (e.g. a decompressed artifact).
pub fn recanonicalize(bytes: &[u8]) -> Result<Vec<u8>> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).context("artifact is not valid json")?;
    to_vec(&value)
}
