//! Run configuration.
//!
//! Layering: `PackConfig::default()` ← config file ← environment ← CLI flags.
//! Each layer is a [`PackConfigOverrides`]; only `Some` values override.

use crate::errors::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Default raw-size cap per batch (leaves headroom for compression framing).
pub const DEFAULT_MAX_BATCH_SIZE: u64 = 950_000;
/// Hard per-unit ceiling of the distribution channel.
pub const DEFAULT_UNIT_LIMIT: u64 = 1_000_000;

pub const ENV_MAX_BATCH_SIZE: &str = "INSCRIBE_MAX_BATCH_SIZE";
pub const ENV_UNIT_LIMIT: &str = "INSCRIBE_UNIT_LIMIT";
pub const ENV_BATCH_PREFIX: &str = "INSCRIBE_BATCH_PREFIX";
pub const ENV_PARALLEL: &str = "INSCRIBE_PARALLEL";
pub const ENV_OUTPUT_DIR: &str = "INSCRIBE_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackConfig {
    /// Cap on a batch's raw (uncompressed) size in bytes.
    pub max_batch_size_bytes: u64,
    /// Cap on a batch's compressed artifact size in bytes.
    pub unit_limit_bytes: u64,
    pub batch_id_prefix: String,
    /// Maximum number of batches finalized concurrently.
    pub parallel: usize,
    pub output_dir: PathBuf,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_batch_size_bytes: DEFAULT_MAX_BATCH_SIZE,
            unit_limit_bytes: DEFAULT_UNIT_LIMIT,
            batch_id_prefix: "batch".into(),
            parallel: 4,
            output_dir: PathBuf::from("inscriptions"),
        }
    }
}

/// Partial overrides for `PackConfig`. Used for config files, env and CLI flags.
/// Unknown keys cause deserialization to fail (deny_unknown_fields).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackConfigOverrides {
    pub max_batch_size_bytes: Option<u64>,
    pub unit_limit_bytes: Option<u64>,
    pub batch_id_prefix: Option<String>,
    pub parallel: Option<usize>,
    pub output_dir: Option<PathBuf>,
}

impl PackConfigOverrides {
    /// Load overrides from a YAML or JSON file (JSON is valid YAML).
    pub fn from_file(path: &Path) -> PackResult<Self> {
        let subject = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PackError::config(&subject, e.to_string()).with_context("reading config file")
        })?;
        serde_yaml::from_str(&text).map_err(|e| {
            PackError::config(&subject, e.to_string())
                .with_context("parsing config file")
                .with_source(e)
        })
    }

    /// Read overrides from `INSCRIBE_*` environment variables.
    pub fn from_env() -> PackResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PackResult<Self> {
        let parse_u64 = |key: &str| -> PackResult<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| PackError::config(key, format!("'{}': {}", v, e)))
                })
                .transpose()
        };

        let parallel = lookup(ENV_PARALLEL)
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|e| PackError::config(ENV_PARALLEL, format!("'{}': {}", v, e)))
            })
            .transpose()?;

        Ok(Self {
            max_batch_size_bytes: parse_u64(ENV_MAX_BATCH_SIZE)?,
            unit_limit_bytes: parse_u64(ENV_UNIT_LIMIT)?,
            batch_id_prefix: lookup(ENV_BATCH_PREFIX),
            parallel,
            output_dir: lookup(ENV_OUTPUT_DIR).map(PathBuf::from),
        })
    }
}

impl PackConfig {
    /// Apply overrides onto this config. Only `Some` values override.
    pub fn apply(self, overrides: PackConfigOverrides) -> Self {
        Self {
            max_batch_size_bytes: overrides
                .max_batch_size_bytes
                .unwrap_or(self.max_batch_size_bytes),
            unit_limit_bytes: overrides.unit_limit_bytes.unwrap_or(self.unit_limit_bytes),
            batch_id_prefix: overrides.batch_id_prefix.unwrap_or(self.batch_id_prefix),
            parallel: overrides.parallel.unwrap_or(self.parallel),
            output_dir: overrides.output_dir.unwrap_or(self.output_dir),
        }
    }

    pub fn validate(&self) -> PackResult<()> {
        if self.max_batch_size_bytes == 0 {
            return Err(PackError::config(
                "max_batch_size_bytes",
                "must be greater than zero",
            ));
        }
        if self.unit_limit_bytes == 0 {
            return Err(PackError::config(
                "unit_limit_bytes",
                "must be greater than zero",
            ));
        }
        if self.parallel == 0 {
            return Err(PackError::config("parallel", "must be at least 1"));
        }
        if !is_safe_stem(&self.batch_id_prefix) {
            return Err(PackError::config(
                "batch_id_prefix",
                format!(
                    "'{}' must be non-empty and use only [A-Za-z0-9_-]",
                    self.batch_id_prefix
                ),
            ));
        }
        Ok(())
    }
}

/// True when `s` can be used verbatim as a file name stem.
pub(crate) fn is_safe_stem(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
