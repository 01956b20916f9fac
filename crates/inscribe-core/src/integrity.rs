//! Integrity index: root hash and aggregate statistics over finalized batches.

use crate::crypto::compute_root_hash;
use crate::errors::{PackError, PackResult, Step};
use crate::finalize::FinalizedBatch;
use serde::{Deserialize, Serialize};

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_batches: usize,
    pub total_groups: usize,
    pub total_entries: usize,
    pub total_uncompressed_size_bytes: u64,
    pub total_compressed_size_bytes: u64,
    pub mean_compression_ratio: f64,
    pub min_compressed_size_bytes: u64,
    pub max_compressed_size_bytes: u64,
    pub oversized_batches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityIndex {
    pub root_hash: String,
    /// Batch content hashes in packing order.
    pub leaf_hashes: Vec<String>,
    pub stats: IndexStats,
}

/// Build the index. `batches` must be in packing order (`position == index`);
/// finalization completion order is rejected.
pub fn build_index(batches: &[FinalizedBatch]) -> PackResult<IntegrityIndex> {
    for (i, batch) in batches.iter().enumerate() {
        if batch.position != i {
            return Err(PackError::integrity(
                Step::Index,
                &batch.batch_id,
                format!(
                    "batch at index {} has packing position {}; results must be in packing order",
                    i, batch.position
                ),
            ));
        }
    }

    let leaf_hashes: Vec<String> = batches.iter().map(|b| b.content_hash.clone()).collect();
    let root_hash = compute_root_hash(&leaf_hashes)?;
    let stats = compute_stats(batches);

    tracing::info!(
        root_hash = %root_hash,
        batches = stats.total_batches,
        total_compressed = stats.total_compressed_size_bytes,
        "built integrity index"
    );

    Ok(IntegrityIndex {
        root_hash,
        leaf_hashes,
        stats,
    })
}

fn compute_stats(batches: &[FinalizedBatch]) -> IndexStats {
    if batches.is_empty() {
        return IndexStats::default();
    }

    let ratio_sum: f64 = batches.iter().map(|b| b.compression_ratio).sum();
    IndexStats {
        total_batches: batches.len(),
        total_groups: batches.iter().map(|b| b.group_ids.len()).sum(),
        total_entries: batches.iter().map(|b| b.entry_count).sum(),
        total_uncompressed_size_bytes: batches.iter().map(|b| b.uncompressed_size).sum(),
        total_compressed_size_bytes: batches.iter().map(|b| b.compressed_size).sum(),
        mean_compression_ratio: ratio_sum / batches.len() as f64,
        min_compressed_size_bytes: batches.iter().map(|b| b.compressed_size).min().unwrap_or(0),
        max_compressed_size_bytes: batches.iter().map(|b| b.compressed_size).max().unwrap_or(0),
        oversized_batches: batches.iter().filter(|b| b.oversized).count(),
    }
}
