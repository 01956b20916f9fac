//! Size-bounded batch packing with integrity manifests.
//!
//! Groups of records are packed greedily, in order, into batches whose raw
//! size stays under a cap. Each batch is canonicalized (JCS), hashed
//! (SHA-256), gzip-compressed and written to disk; a manifest records every
//! batch plus a root hash over the ordered batch content hashes.

pub mod catalog;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod finalize;
pub mod integrity;
pub mod manifest;
pub mod pack;
pub mod pipeline;
pub mod snapshot;
pub mod verify;

// Convenience re-exports
pub use catalog::{ContentGroup, ContentSource, ContentUnit, DirectoryCatalog, MemoryCatalog};
pub use config::{PackConfig, PackConfigOverrides};
pub use errors::{ErrorKind, PackError, PackResult, Step};
pub use finalize::{finalize_batch, FinalizedBatch};
pub use integrity::{build_index, IndexStats, IntegrityIndex};
pub use manifest::{export_manifest, BatchSummary, Manifest, MANIFEST_FILE};
pub use pack::{pack_groups, PackPlan, RawBatch, SizeViolation};
pub use pipeline::{run_pipeline, PipelineOutcome};
pub use verify::{verify_manifest, verify_manifest_with_limits, VerifyLimits, VerifyReport};
