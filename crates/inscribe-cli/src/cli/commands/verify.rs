use crate::cli::args::VerifyArgs;
use crate::exit_codes;
use anyhow::{Context, Result};
use inscribe_core::{verify_manifest_with_limits, VerifyLimits};

pub fn run(args: VerifyArgs) -> Result<i32> {
    let mut limits = VerifyLimits::default();
    if let Some(max) = args.max_decode_bytes {
        limits.max_decode_bytes = max;
    }

    let report = verify_manifest_with_limits(&args.dir, limits)
        .with_context(|| format!("verification failed for {}", args.dir.display()))?;

    eprintln!(
        "Manifest verified ({}): {} batches OK, root {}",
        args.dir.display(),
        report.batches_verified,
        report.computed_root_hash
    );
    Ok(exit_codes::SUCCESS)
}
