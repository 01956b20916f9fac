//! Batch finalization: canonicalize → hash → compress → hash → persist.
//!
//! Each batch produces two files in the output directory:
//! - `<batch_id>.json.gz`: distribution artifact (gzip, level 9, fixed header)
//! - `<batch_id>_reference.json`: pretty-printed audit copy
//!
//! `content_hash` covers the canonical (pre-compression) bytes and is the
//! portable identity of a batch. `compressed_hash` depends on the gzip
//! implementation and is recorded for transport checks only.

use crate::catalog::{ContentGroup, ContentUnit};
use crate::crypto::{jcs, sha256_hex};
use crate::errors::{PackError, PackResult, Step};
use crate::pack::RawBatch;
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Version of the batch document layout.
pub const BATCH_FORMAT_VERSION: &str = "1.0.0";
pub const COMPRESSION_ALGORITHM: &str = "gzip";

/// Canonical content of one batch. Contains no timestamps so the same groups
/// always produce the same bytes.
#[derive(Debug, Serialize)]
struct BatchDocumentRef<'a> {
    format_version: &'a str,
    batch_id: &'a str,
    group_ids: Vec<&'a str>,
    entry_count: usize,
    groups: Vec<DocumentGroupRef<'a>>,
}

#[derive(Debug, Serialize)]
struct DocumentGroupRef<'a> {
    id: &'a str,
    name: &'a str,
    units: &'a [ContentUnit],
}

/// Owned batch document, as read back from an artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchDocument {
    pub format_version: String,
    pub batch_id: String,
    pub group_ids: Vec<String>,
    pub entry_count: usize,
    pub groups: Vec<DocumentGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentGroup {
    pub id: String,
    pub name: String,
    pub units: Vec<ContentUnit>,
}

/// A closed, hashed and persisted batch. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedBatch {
    pub batch_id: String,
    pub position: usize,
    pub group_ids: Vec<String>,
    pub entry_count: usize,
    /// Sum of the groups' raw sizes (the packing measure).
    pub uncompressed_size: u64,
    /// Length of the canonical bytes that were compressed.
    pub canonical_size: u64,
    pub compressed_size: u64,
    /// `compressed_size / canonical_size`.
    pub compression_ratio: f64,
    pub content_hash: String,
    pub compressed_hash: String,
    /// Artifact file name, relative to the output directory.
    pub artifact_path: String,
    pub reference_path: String,
    pub oversized: bool,
    pub within_unit_limit: bool,
}

pub fn artifact_file_name(batch_id: &str) -> String {
    format!("{}.json.gz", batch_id)
}

pub fn reference_file_name(batch_id: &str) -> String {
    format!("{}_reference.json", batch_id)
}

fn document(batch: &RawBatch) -> BatchDocumentRef<'_> {
    BatchDocumentRef {
        format_version: BATCH_FORMAT_VERSION,
        batch_id: &batch.batch_id,
        group_ids: batch.groups.iter().map(|g| g.id.as_str()).collect(),
        entry_count: batch.entry_count(),
        groups: batch
            .groups
            .iter()
            .map(|g: &ContentGroup| DocumentGroupRef {
                id: &g.id,
                name: &g.name,
                units: &g.units,
            })
            .collect(),
    }
}

/// Canonical bytes of a batch document.
pub fn canonical_bytes(batch: &RawBatch) -> PackResult<Vec<u8>> {
    jcs::to_vec(&document(batch)).map_err(|e| {
        PackError::serialization(&batch.batch_id, format!("{:#}", e)).with_source(e)
    })
}

/// Gzip at maximum level with a fixed header (mtime 0, OS unknown).
pub fn compress(batch_id: &str, bytes: &[u8]) -> PackResult<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(Vec::with_capacity(bytes.len() / 2), Compression::best());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| PackError::compression(batch_id, e.to_string()).with_source(e))
}

/// Finalize one batch and write its artifacts into `out_dir`.
pub fn finalize_batch(
    batch: RawBatch,
    out_dir: &Path,
    unit_limit_bytes: u64,
) -> PackResult<FinalizedBatch> {
    let canonical = canonical_bytes(&batch)?;
    let content_hash = sha256_hex(&canonical);

    let compressed = compress(&batch.batch_id, &canonical)?;
    let compressed_hash = sha256_hex(&compressed);

    let canonical_size = canonical.len() as u64;
    let compressed_size = compressed.len() as u64;
    let compression_ratio = if canonical_size == 0 {
        0.0
    } else {
        compressed_size as f64 / canonical_size as f64
    };

    let artifact_path = artifact_file_name(&batch.batch_id);
    let reference_path = reference_file_name(&batch.batch_id);

    let pretty = serde_json::to_vec_pretty(&document(&batch)).map_err(|e| {
        PackError::serialization(&batch.batch_id, e.to_string())
            .with_context("rendering reference copy")
            .with_source(e)
    })?;

    std::fs::write(out_dir.join(&artifact_path), &compressed)
        .map_err(|e| PackError::io(Step::Persist, &batch.batch_id, e))?;
    std::fs::write(out_dir.join(&reference_path), &pretty)
        .map_err(|e| PackError::io(Step::Persist, &batch.batch_id, e))?;

    let within_unit_limit = compressed_size <= unit_limit_bytes;
    if !within_unit_limit {
        tracing::warn!(
            batch_id = %batch.batch_id,
            compressed_size,
            unit_limit_bytes,
            "compressed batch exceeds the per-unit limit"
        );
    }

    tracing::info!(
        batch_id = %batch.batch_id,
        groups = batch.groups.len(),
        raw_size = batch.raw_size,
        compressed_size,
        compression_ratio,
        "finalized batch"
    );

    Ok(FinalizedBatch {
        group_ids: batch.group_ids(),
        entry_count: batch.entry_count(),
        batch_id: batch.batch_id,
        position: batch.position,
        uncompressed_size: batch.raw_size,
        canonical_size,
        compressed_size,
        compression_ratio,
        content_hash,
        compressed_hash,
        artifact_path,
        reference_path,
        oversized: batch.oversized,
        within_unit_limit,
    })
}
