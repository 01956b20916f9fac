//! SHA-256 helpers and the root hash over batch content hashes.
//!
//! # Root scheme
//!
//! ```text
//! root_hash = sha256( raw(content_hash[0]) || raw(content_hash[1]) || ... )
//! ```
//!
//! `raw(h)` is the 32-byte digest decoded from its hex form. This is a flat
//! ordered digest: it detects tampering and reordering across the whole
//! batch set but cannot produce per-batch inclusion proofs.

use crate::errors::{PackError, PackResult, Step};
use sha2::{Digest, Sha256};

/// Hash algorithm identifier recorded in the manifest.
pub const HASH_ALGORITHM: &str = "sha256";
/// Root computation recorded in the manifest.
pub const ROOT_SCHEME: &str = "sha256(concat(raw(content_hash)))";

const DIGEST_LEN: usize = 32;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compute the root hash over ordered leaf hashes (lowercase hex).
///
/// An empty leaf set yields the hash of the empty byte string.
///
/// # Example
///
/// ```
/// use inscribe_core::crypto::compute_root_hash;
///
/// let root = compute_root_hash(&[]).unwrap();
/// assert_eq!(
///     root,
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn compute_root_hash(leaf_hashes: &[String]) -> PackResult<String> {
    let mut hasher = Sha256::new();
    for (i, leaf) in leaf_hashes.iter().enumerate() {
        let raw = hex::decode(leaf).map_err(|e| {
            PackError::integrity(Step::Index, format!("leaf #{}", i), e.to_string())
                .with_context("leaf hash is not hex")
        })?;
        if raw.len() != DIGEST_LEN {
            return Err(PackError::integrity(
                Step::Index,
                format!("leaf #{}", i),
                format!("expected {} digest bytes, found {}", DIGEST_LEN, raw.len()),
            ));
        }
        hasher.update(&raw);
    }
    Ok(hex::encode(hasher.finalize()))
}
