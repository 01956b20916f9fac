//! Run manifest: the single artifact handed to the deployment step.
//!
//! Serialized as pretty JSON. Key order follows field declaration order, so
//! two manifests of the same run diff cleanly. Consumers must submit batches
//! in `batches` order.

use crate::config::PackConfig;
use crate::crypto::{HASH_ALGORITHM, ROOT_SCHEME};
use crate::errors::{PackError, PackResult, Step};
use crate::finalize::{FinalizedBatch, COMPRESSION_ALGORITHM};
use crate::integrity::{IndexStats, IntegrityIndex};
use crate::snapshot::ManifestSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    /// Fresh per run (UUID v7), so re-runs never alias a prior manifest.
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub producer: ProducerMeta,
    pub max_batch_size_bytes: u64,
    pub compression_algorithm_name: String,
    pub hash_algorithm_name: String,
    pub batches: Vec<BatchSummary>,
    pub integrity: IntegrityBlock,
    pub stats: IndexStats,
    pub deployment: DeploymentMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerMeta {
    pub name: String,
    pub version: String,
}

impl Default for ProducerMeta {
    fn default() -> Self {
        Self {
            name: "inscribe".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub batch_id: String,
    pub included_group_ids: Vec<String>,
    pub entry_count: usize,
    pub uncompressed_size_bytes: u64,
    pub canonical_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub compression_ratio: f64,
    pub content_hash_hex: String,
    pub compressed_hash_hex: String,
    pub artifact_path: String,
    pub reference_path: String,
    pub oversized: bool,
    pub within_unit_limit: bool,
}

impl From<&FinalizedBatch> for BatchSummary {
    fn from(b: &FinalizedBatch) -> Self {
        Self {
            batch_id: b.batch_id.clone(),
            included_group_ids: b.group_ids.clone(),
            entry_count: b.entry_count,
            uncompressed_size_bytes: b.uncompressed_size,
            canonical_size_bytes: b.canonical_size,
            compressed_size_bytes: b.compressed_size,
            compression_ratio: b.compression_ratio,
            content_hash_hex: b.content_hash.clone(),
            compressed_hash_hex: b.compressed_hash.clone(),
            artifact_path: b.artifact_path.clone(),
            reference_path: b.reference_path.clone(),
            oversized: b.oversized,
            within_unit_limit: b.within_unit_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrityBlock {
    pub root_hash_hex: String,
    pub leaf_hash_hex: Vec<String>,
    pub hash_algorithm: String,
    pub root_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentMeta {
    pub unit_limit_bytes: u64,
    pub compression_algorithm_name: String,
    pub encoding: String,
}

impl Manifest {
    /// Assemble a manifest from finalized batches (packing order) and their index.
    pub fn build(
        config: &PackConfig,
        batches: &[FinalizedBatch],
        index: IntegrityIndex,
        run_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.into(),
            run_id,
            created_at,
            producer: ProducerMeta::default(),
            max_batch_size_bytes: config.max_batch_size_bytes,
            compression_algorithm_name: COMPRESSION_ALGORITHM.into(),
            hash_algorithm_name: HASH_ALGORITHM.into(),
            batches: batches.iter().map(BatchSummary::from).collect(),
            integrity: IntegrityBlock {
                root_hash_hex: index.root_hash,
                leaf_hash_hex: index.leaf_hashes,
                hash_algorithm: HASH_ALGORITHM.into(),
                root_scheme: ROOT_SCHEME.into(),
            },
            stats: index.stats,
            deployment: DeploymentMeta {
                unit_limit_bytes: config.unit_limit_bytes,
                compression_algorithm_name: COMPRESSION_ALGORITHM.into(),
                encoding: "utf-8".into(),
            },
        }
    }

    /// Concatenation of every batch's group ids, in manifest order.
    pub fn group_sequence(&self) -> Vec<&str> {
        self.batches
            .iter()
            .flat_map(|b| b.included_group_ids.iter().map(String::as_str))
            .collect()
    }

    pub fn to_pretty_json(&self) -> PackResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(|e| {
            PackError::serialization(MANIFEST_FILE, e.to_string())
                .with_context("rendering manifest")
                .with_source(e)
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn load(path: &Path) -> PackResult<Self> {
        let subject = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| PackError::io(Step::Verify, &subject, e))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PackError::integrity(Step::Verify, &subject, e.to_string())
                .with_context("manifest is not valid")
                .with_source(e)
        })
    }
}

/// Write `manifest` to `path`, snapshotting any previous manifest first.
///
/// The previous bytes go to `<path>.bak`; the new manifest is written to a
/// temporary file and renamed into place. On failure the original file is
/// left (or put back) as it was. Returns the snapshot location, if any.
pub fn export_manifest(manifest: &Manifest, path: &Path) -> PackResult<Option<PathBuf>> {
    let bytes = manifest.to_pretty_json()?;
    let snapshot = ManifestSnapshot::take(path)?;
    let backup = snapshot.backup_path().map(Path::to_path_buf);
    snapshot.commit(&bytes)?;
    tracing::info!(
        path = %path.display(),
        run_id = %manifest.run_id,
        batches = manifest.batches.len(),
        "manifest written"
    );
    Ok(backup)
}
