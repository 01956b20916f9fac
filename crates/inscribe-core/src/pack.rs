//! Greedy, order-preserving batch packer.
//!
//! Groups are atomic: a batch never splits one. A batch closes as soon as the
//! next group would push its raw size past the cap, so batch order (and the
//! order of groups inside each batch) always matches input order. A group
//! larger than the cap on its own becomes a single oversized batch.

use crate::catalog::ContentGroup;
use crate::errors::PackResult;
use serde::Serialize;

/// An open or closed, not yet finalized, batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    pub batch_id: String,
    /// Zero-based position in packing order.
    pub position: usize,
    pub groups: Vec<ContentGroup>,
    /// Sum of the groups' raw sizes.
    pub raw_size: u64,
    pub oversized: bool,
}

impl RawBatch {
    fn open(prefix: &str, position: usize) -> Self {
        Self {
            batch_id: batch_id(prefix, position),
            position,
            groups: Vec::new(),
            raw_size: 0,
            oversized: false,
        }
    }

    fn push(&mut self, group: ContentGroup, size: u64) {
        self.groups.push(group);
        self.raw_size += size;
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.id.clone()).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(ContentGroup::unit_count).sum()
    }
}

/// A single group whose raw size alone exceeds the cap. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeViolation {
    pub batch_id: String,
    pub group_id: String,
    pub group_size_bytes: u64,
    pub max_batch_size_bytes: u64,
}

/// Output of [`pack_groups`].
#[derive(Debug, Clone, Default)]
pub struct PackPlan {
    pub batches: Vec<RawBatch>,
    pub violations: Vec<SizeViolation>,
}

/// `<prefix>_<NNN>`, 1-based, at least three digits.
pub fn batch_id(prefix: &str, position: usize) -> String {
    format!("{}_{:03}", prefix, position + 1)
}

/// Pack groups into size-bounded batches, preserving input order.
///
/// Fails only when a group's size cannot be computed.
pub fn pack_groups(
    groups: Vec<ContentGroup>,
    max_batch_size: u64,
    prefix: &str,
) -> PackResult<PackPlan> {
    let mut plan = PackPlan::default();
    let mut current = RawBatch::open(prefix, 0);

    for group in groups {
        let size = group.raw_size()?;

        if !current.is_empty() && current.raw_size + size > max_batch_size {
            let next = RawBatch::open(prefix, current.position + 1);
            close(&mut plan, std::mem::replace(&mut current, next));
        }

        tracing::debug!(
            batch_id = %current.batch_id,
            group_id = %group.id,
            size,
            "assigned group"
        );

        if current.is_empty() && size > max_batch_size {
            current.oversized = true;
            tracing::warn!(
                batch_id = %current.batch_id,
                group_id = %group.id,
                size,
                max_batch_size,
                "group exceeds batch size cap; emitting oversized batch for review"
            );
            plan.violations.push(SizeViolation {
                batch_id: current.batch_id.clone(),
                group_id: group.id.clone(),
                group_size_bytes: size,
                max_batch_size_bytes: max_batch_size,
            });
        }

        current.push(group, size);
    }

    if !current.is_empty() {
        close(&mut plan, current);
    }

    Ok(plan)
}

fn close(plan: &mut PackPlan, batch: RawBatch) {
    tracing::info!(
        batch_id = %batch.batch_id,
        groups = batch.groups.len(),
        raw_size = batch.raw_size,
        oversized = batch.oversized,
        "closed batch"
    );
    plan.batches.push(batch);
}
