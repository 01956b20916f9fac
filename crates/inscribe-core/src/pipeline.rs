//! End-to-end run: load → pack → finalize (parallel) → index → export.
//!
//! Batches are finalized into a staging directory. Nothing replaces the
//! previous run's artifacts or manifest unless every batch finalized.

use crate::catalog::ContentSource;
use crate::config::PackConfig;
use crate::errors::{ErrorKind, PackError, PackResult, Step};
use crate::finalize::{finalize_batch, FinalizedBatch};
use crate::integrity::build_index;
use crate::manifest::{export_manifest, Manifest, MANIFEST_FILE};
use crate::pack::{pack_groups, RawBatch, SizeViolation};
use crate::snapshot::ArtifactStage;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};

/// Result of one run. Statistics live in `manifest.stats`.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    /// Snapshot of the manifest this run replaced, if any.
    pub previous_manifest: Option<PathBuf>,
    pub violations: Vec<SizeViolation>,
}

pub async fn run_pipeline<S>(source: &S, config: &PackConfig) -> PackResult<PipelineOutcome>
where
    S: ContentSource + ?Sized,
{
    config.validate()?;

    let groups = source.groups()?;
    let plan = pack_groups(groups, config.max_batch_size_bytes, &config.batch_id_prefix)?;
    tracing::info!(
        batches = plan.batches.len(),
        oversized = plan.violations.len(),
        max_batch_size = config.max_batch_size_bytes,
        "packing complete"
    );

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        PackError::io(Step::Persist, config.output_dir.display().to_string(), e)
            .with_context("creating output directory")
    })?;

    let run_id = uuid::Uuid::now_v7().to_string();
    // Dropped on any early return below: the previous run's files come back.
    let mut stage = ArtifactStage::create(&config.output_dir, &run_id)?;

    let mut finalized = finalize_all(plan.batches, stage.dir(), config, finalize_batch).await?;
    // Completion order is arbitrary; the root is defined over packing order.
    finalized.sort_by_key(|b| b.position);

    let index = build_index(&finalized)?;
    let manifest = Manifest::build(config, &finalized, index, run_id, Utc::now());

    for batch in &finalized {
        stage.promote(&batch.batch_id, &batch.artifact_path)?;
        stage.promote(&batch.batch_id, &batch.reference_path)?;
    }

    let manifest_path = config.output_dir.join(MANIFEST_FILE);
    let previous_manifest = export_manifest(&manifest, &manifest_path)?;
    stage.commit();

    Ok(PipelineOutcome {
        manifest,
        manifest_path,
        previous_manifest,
        violations: plan.violations,
    })
}

type Finalizer = fn(RawBatch, &Path, u64) -> PackResult<FinalizedBatch>;

/// Finalize every batch on the blocking pool, at most `config.parallel` at a
/// time. After the first failure no further batch is started; batches already
/// running are awaited so nothing is still writing when the caller cleans up.
async fn finalize_all(
    batches: Vec<RawBatch>,
    out_dir: &Path,
    config: &PackConfig,
    finalizer: Finalizer,
) -> PackResult<Vec<FinalizedBatch>> {
    let total = batches.len();
    let sem = Arc::new(Semaphore::new(config.parallel));
    let out_dir = Arc::new(out_dir.to_path_buf());
    let failed = Arc::new(AtomicBool::new(false));
    let unit_limit = config.unit_limit_bytes;
    let mut join_set = JoinSet::new();
    let mut task_batches: HashMap<Id, String> = HashMap::with_capacity(total);

    for batch in batches {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PackError::config("parallel", e.to_string()))?;
        if failed.load(Ordering::Acquire) {
            break;
        }

        let batch_id = batch.batch_id.clone();
        let out_dir = Arc::clone(&out_dir);
        let failed = Arc::clone(&failed);
        let handle = join_set.spawn_blocking(move || {
            let _permit = permit;
            let result = finalizer(batch, &out_dir, unit_limit);
            if result.is_err() {
                failed.store(true, Ordering::Release);
            }
            result
        });
        task_batches.insert(handle.id(), batch_id);
    }

    let mut done = Vec::with_capacity(total);
    let mut first_error: Option<PackError> = None;
    while let Some(res) = join_set.join_next_with_id().await {
        match settle(res, &task_batches) {
            Ok(batch) => done.push(batch),
            Err(e) => {
                if first_error.is_none() {
                    tracing::error!(
                        subject = %e.subject,
                        step = %e.step,
                        kind = %e.kind,
                        "batch finalization failed; aborting run before manifest export"
                    );
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(done),
    }
}

fn settle(
    res: Result<(Id, PackResult<FinalizedBatch>), JoinError>,
    task_batches: &HashMap<Id, String>,
) -> PackResult<FinalizedBatch> {
    match res {
        Ok((_, result)) => result,
        Err(e) => {
            let batch_id = task_batches
                .get(&e.id())
                .cloned()
                .unwrap_or_else(|| "unknown".into());
            let cause = if e.is_panic() { "panicked" } else { "was cancelled" };
            Err(PackError::new(
                ErrorKind::Integrity,
                Step::Persist,
                batch_id,
                format!("finalization task {}", cause),
            ))
        }
    }
}
