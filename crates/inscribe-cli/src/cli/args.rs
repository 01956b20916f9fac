//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "inscribe",
    version,
    about = "Pack content groups into size-bounded, hash-verified batches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pack a catalog into compressed batches and write the manifest
    Pack(PackArgs),
    /// Verify a manifest and every artifact it references
    Verify(VerifyArgs),
    /// Print a manifest (verify first unless --no-verify)
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    /// Catalog directory (index.json + groups/<id>.json)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Output directory for artifacts and manifest.json
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Config file (YAML or JSON) with PackConfig overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Raw-size cap per batch, in bytes
    #[arg(long)]
    pub max_batch_size: Option<u64>,

    /// Compressed-size ceiling per distribution unit, in bytes
    #[arg(long)]
    pub unit_limit: Option<u64>,

    /// Batch id prefix (ids are <prefix>_001, <prefix>_002, ...)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Number of batches finalized concurrently
    #[arg(long)]
    pub parallel: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Directory containing manifest.json and the batch artifacts
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Maximum decompressed bytes per artifact
    #[arg(long)]
    pub max_decode_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ShowFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Directory containing manifest.json
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Skip verification (show even if artifacts are missing or corrupt)
    #[arg(long)]
    pub no_verify: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: ShowFormat,
}
