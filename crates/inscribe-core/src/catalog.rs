//! Content catalog: the ordered groups of records fed to the packer.
//!
//! # Directory layout
//!
//! ```text
//! <root>/index.json          {"groups": [{"id", "name", "unit_count"}, ...]}
//! <root>/groups/<id>.json    [record, record, ...]
//! ```
//!
//! Index order is group order. Group files are read in that order.

use crate::config::is_safe_stem;
use crate::crypto::jcs;
use crate::errors::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.json";
pub const GROUPS_DIR: &str = "groups";

/// A single record. The payload is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentUnit(pub serde_json::Value);

impl ContentUnit {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

/// An identified, ordered collection of records.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentGroup {
    pub id: String,
    pub name: String,
    pub units: Vec<ContentUnit>,
}

/// Canonical serialized length of a list of records.
pub fn units_size(units: &[ContentUnit]) -> anyhow::Result<u64> {
    jcs::to_vec(&units).map(|bytes| bytes.len() as u64)
}

impl ContentGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, units: Vec<ContentUnit>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            units,
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Byte length of the group's records as a canonical (JCS) JSON array.
    ///
    /// This is the size measured against `max_batch_size_bytes`. It survives a
    /// round trip through an artifact unchanged, so verification can recompute it.
    pub fn raw_size(&self) -> PackResult<u64> {
        units_size(&self.units).map_err(|e| {
            PackError::input(&self.id, format!("{:#}", e))
                .with_context("computing serialized size")
                .with_source(e)
        })
    }
}

/// Upstream supplier of groups.
pub trait ContentSource {
    /// Return every group in delivery order.
    fn groups(&self) -> PackResult<Vec<ContentGroup>>;
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    groups: Vec<ContentGroup>,
}

impl MemoryCatalog {
    pub fn new(groups: Vec<ContentGroup>) -> Self {
        Self { groups }
    }
}

impl ContentSource for MemoryCatalog {
    fn groups(&self) -> PackResult<Vec<ContentGroup>> {
        Ok(self.groups.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogIndex {
    pub groups: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    /// Expected record count; checked against the group file when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_count: Option<usize>,
}

/// Source backed by an `index.json` plus one JSON file per group.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_index(&self) -> PackResult<CatalogIndex> {
        let path = self.root.join(INDEX_FILE);
        let bytes = std::fs::read(&path).map_err(|e| {
            PackError::input(INDEX_FILE, e.to_string())
                .with_context(format!("reading {}", path.display()))
                .with_source(e)
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PackError::input(INDEX_FILE, e.to_string())
                .with_context("parsing catalog index")
                .with_source(e)
        })
    }

    fn read_group(&self, entry: &IndexEntry) -> PackResult<ContentGroup> {
        let path = self
            .root
            .join(GROUPS_DIR)
            .join(format!("{}.json", entry.id));
        let bytes = std::fs::read(&path).map_err(|e| {
            PackError::input(&entry.id, e.to_string())
                .with_context(format!("reading {}", path.display()))
                .with_source(e)
        })?;
        let units: Vec<ContentUnit> = serde_json::from_slice(&bytes).map_err(|e| {
            PackError::input(&entry.id, e.to_string())
                .with_context("group file must be a json array of records")
                .with_source(e)
        })?;

        if let Some(expected) = entry.unit_count {
            if expected != units.len() {
                return Err(PackError::input(
                    &entry.id,
                    format!(
                        "index lists {} records but group file holds {}",
                        expected,
                        units.len()
                    ),
                ));
            }
        }

        Ok(ContentGroup::new(&entry.id, &entry.name, units))
    }
}

impl ContentSource for DirectoryCatalog {
    fn groups(&self) -> PackResult<Vec<ContentGroup>> {
        let index = self.read_index()?;
        let mut seen = HashSet::with_capacity(index.groups.len());
        let mut groups = Vec::with_capacity(index.groups.len());

        for entry in &index.groups {
            if !is_safe_stem(&entry.id) {
                return Err(PackError::input(
                    &entry.id,
                    "group id must be non-empty and use only [A-Za-z0-9_-]",
                ));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(PackError::input(&entry.id, "duplicate group id in index"));
            }
            let group = self.read_group(entry)?;
            tracing::debug!(
                group_id = %group.id,
                units = group.unit_count(),
                "loaded group"
            );
            groups.push(group);
        }

        tracing::info!(
            root = %self.root.display(),
            groups = groups.len(),
            "catalog loaded"
        );
        Ok(groups)
    }
}
