//! Manifest verification against the artifacts on disk.
//!
//! # Checks Performed
//!
//! Per batch, in manifest order:
//! 1. **Path Safety**: artifact path is a bare file name
//! 2. **Transport**: artifact size and `compressed_hash_hex` match
//! 3. **Decode**: gzip stream decodes within `max_decode_bytes`
//! 4. **Content**: re-canonicalized bytes match `content_hash_hex` and
//!    `canonical_size_bytes`
//! 5. **Contract**: decoded document names the same batch and group ids, its
//!    groups carry those ids, and entry count, `uncompressed_size_bytes` and
//!    `oversized` recompute from the decoded records
//!
//! Then for the whole run:
//! 6. **Leaves**: `leaf_hash_hex` equals the batch content hashes in order
//! 7. **Root**: recomputed root equals `root_hash_hex`

use crate::catalog::units_size;
use crate::crypto::{compute_root_hash, jcs, sha256_hex};
use crate::errors::{PackError, PackResult, Step};
use crate::finalize::BatchDocument;
use crate::manifest::{BatchSummary, Manifest, MANIFEST_FILE};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};

/// Resource limits for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyLimits {
    pub max_artifact_bytes: u64,
    pub max_decode_bytes: u64,
}

impl Default for VerifyLimits {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 64_u64 * 1024 * 1024,
            max_decode_bytes: 512_u64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub manifest: Manifest,
    pub batches_verified: usize,
    pub computed_root_hash: String,
}

/// A reader that limits the total number of bytes read and fails explicitly on overflow.
struct LimitReader<R> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R: Read> LimitReader<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.read >= self.limit {
            // Probe one byte: reaching the limit exactly at EOF is fine.
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(std::io::Error::other(format!(
                    "decoded size exceeded limit of {} bytes",
                    self.limit
                ))),
            };
        }

        let max_to_read = (self.limit - self.read).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_to_read])?;
        self.read += n as u64;
        Ok(n)
    }
}

/// Verify `<dir>/manifest.json` and every artifact it references.
pub fn verify_manifest(dir: &Path) -> PackResult<VerifyReport> {
    verify_manifest_with_limits(dir, VerifyLimits::default())
}

pub fn verify_manifest_with_limits(dir: &Path, limits: VerifyLimits) -> PackResult<VerifyReport> {
    let manifest = Manifest::load(&dir.join(MANIFEST_FILE))?;

    for summary in &manifest.batches {
        verify_batch(dir, summary, manifest.max_batch_size_bytes, limits)?;
        tracing::debug!(batch_id = %summary.batch_id, "batch verified");
    }

    let content_hashes: Vec<String> = manifest
        .batches
        .iter()
        .map(|b| b.content_hash_hex.clone())
        .collect();
    if content_hashes != manifest.integrity.leaf_hash_hex {
        return Err(PackError::integrity(
            Step::Verify,
            MANIFEST_FILE,
            "leaf hash list does not match batch content hashes in manifest order",
        ));
    }

    let computed_root_hash = compute_root_hash(&content_hashes)
        .map_err(|e| PackError::integrity(Step::Verify, e.subject, e.message))?;
    if computed_root_hash != manifest.integrity.root_hash_hex {
        return Err(PackError::integrity(
            Step::Verify,
            MANIFEST_FILE,
            format!(
                "root hash mismatch: manifest {} computed {}",
                manifest.integrity.root_hash_hex, computed_root_hash
            ),
        ));
    }

    tracing::info!(
        dir = %dir.display(),
        batches = manifest.batches.len(),
        root_hash = %computed_root_hash,
        "manifest verified"
    );

    Ok(VerifyReport {
        batches_verified: manifest.batches.len(),
        manifest,
        computed_root_hash,
    })
}

fn verify_batch(
    dir: &Path,
    summary: &BatchSummary,
    max_batch_size: u64,
    limits: VerifyLimits,
) -> PackResult<()> {
    let id = summary.batch_id.as_str();
    let fail = |message: String| PackError::integrity(Step::Verify, id, message);

    let rel = Path::new(&summary.artifact_path);
    let mut components = rel.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(fail(format!(
                "artifact path '{}' must be a plain file name",
                summary.artifact_path
            )))
        }
    }

    let path = dir.join(rel);
    let declared = std::fs::metadata(&path)
        .map_err(|e| PackError::io(Step::Verify, id, e).with_context("artifact missing"))?
        .len();
    if declared > limits.max_artifact_bytes {
        return Err(fail(format!(
            "artifact is {} bytes, limit is {}",
            declared, limits.max_artifact_bytes
        )));
    }

    let compressed = std::fs::read(&path).map_err(|e| PackError::io(Step::Verify, id, e))?;
    if compressed.len() as u64 != summary.compressed_size_bytes {
        return Err(fail(format!(
            "compressed size mismatch: manifest {} actual {}",
            summary.compressed_size_bytes,
            compressed.len()
        )));
    }
    let compressed_hash = sha256_hex(&compressed);
    if compressed_hash != summary.compressed_hash_hex {
        return Err(fail(format!(
            "compressed hash mismatch: manifest {} actual {}",
            summary.compressed_hash_hex, compressed_hash
        )));
    }

    let mut decoded = Vec::new();
    LimitReader::new(GzDecoder::new(compressed.as_slice()), limits.max_decode_bytes)
        .read_to_end(&mut decoded)
        .map_err(|e| fail(format!("gzip decode failed: {}", e)))?;

    let canonical = jcs::recanonicalize(&decoded).map_err(|e| fail(format!("{:#}", e)))?;
    let content_hash = sha256_hex(&canonical);
    if content_hash != summary.content_hash_hex {
        return Err(fail(format!(
            "content hash mismatch: manifest {} actual {}",
            summary.content_hash_hex, content_hash
        )));
    }
    if canonical.len() as u64 != summary.canonical_size_bytes {
        return Err(fail(format!(
            "canonical size mismatch: manifest {} actual {}",
            summary.canonical_size_bytes,
            canonical.len()
        )));
    }

    let doc: BatchDocument = serde_json::from_slice(&canonical)
        .map_err(|e| fail(format!("artifact is not a batch document: {}", e)))?;
    if doc.batch_id != summary.batch_id || doc.group_ids != summary.included_group_ids {
        return Err(fail(format!(
            "artifact describes batch '{}' with groups {:?}",
            doc.batch_id, doc.group_ids
        )));
    }
    if !doc.groups.iter().map(|g| &g.id).eq(doc.group_ids.iter()) {
        return Err(fail(format!(
            "artifact group_ids {:?} disagree with its groups",
            doc.group_ids
        )));
    }

    let units: usize = doc.groups.iter().map(|g| g.units.len()).sum();
    if doc.entry_count != summary.entry_count || units != summary.entry_count {
        return Err(fail(format!(
            "entry count mismatch: manifest {} artifact {} records {}",
            summary.entry_count, doc.entry_count, units
        )));
    }

    let mut raw_size = 0u64;
    for group in &doc.groups {
        raw_size += units_size(&group.units).map_err(|e| fail(format!("{:#}", e)))?;
    }
    if raw_size != summary.uncompressed_size_bytes {
        return Err(fail(format!(
            "uncompressed size mismatch: manifest {} actual {}",
            summary.uncompressed_size_bytes, raw_size
        )));
    }

    let oversized = doc.groups.len() == 1 && raw_size > max_batch_size;
    if oversized != summary.oversized {
        return Err(fail(format!(
            "oversized flag mismatch: manifest {} actual {} (size {}, cap {})",
            summary.oversized, oversized, raw_size, max_batch_size
        )));
    }

    Ok(())
}
