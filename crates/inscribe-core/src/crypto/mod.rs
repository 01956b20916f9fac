//! Canonical serialization and digests.

pub mod digest;
pub mod jcs;

pub use digest::{compute_root_hash, sha256_hex, HASH_ALGORITHM, ROOT_SCHEME};
