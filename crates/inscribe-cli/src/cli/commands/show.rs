use crate::cli::args::{ShowArgs, ShowFormat};
use crate::exit_codes;
use anyhow::{Context, Result};
use inscribe_core::{verify_manifest, Manifest, MANIFEST_FILE};

pub fn run(args: ShowArgs) -> Result<i32> {
    // Verify first (unless skipped)
    let manifest = if args.no_verify {
        Manifest::load(&args.dir.join(MANIFEST_FILE))?
    } else {
        verify_manifest(&args.dir)
            .context("Verification FAILED (use --no-verify to inspect corrupt output)")?
            .manifest
    };

    if args.format == ShowFormat::Json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(exit_codes::SUCCESS);
    }

    println!("Inscription Manifest");
    println!("====================");
    println!("Version:     {}", manifest.version);
    println!("Run ID:      {}", manifest.run_id);
    println!("Created:     {}", manifest.created_at.to_rfc3339());
    println!(
        "Producer:    {} v{}",
        manifest.producer.name, manifest.producer.version
    );
    println!("Max Batch:   {} bytes", manifest.max_batch_size_bytes);
    println!("Unit Limit:  {} bytes", manifest.deployment.unit_limit_bytes);
    println!(
        "Algorithms:  {} / {}",
        manifest.compression_algorithm_name, manifest.hash_algorithm_name
    );
    println!("Root Hash:   {}", manifest.integrity.root_hash_hex);
    println!(
        "Mean Ratio:  {:.1}%",
        manifest.stats.mean_compression_ratio * 100.0
    );
    println!();

    for (i, b) in manifest.batches.iter().enumerate() {
        println!(
            "[{:>3}] {}  {}  {} bytes  {}{}",
            i + 1,
            b.batch_id,
            b.artifact_path,
            b.compressed_size_bytes,
            b.content_hash_hex.chars().take(16).collect::<String>(),
            if b.oversized { "  (oversized)" } else { "" }
        );
        println!("      groups: {}", b.included_group_ids.join(", "));
    }

    Ok(exit_codes::SUCCESS)
}
