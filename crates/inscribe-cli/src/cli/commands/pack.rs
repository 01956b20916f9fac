use crate::cli::args::PackArgs;
use crate::exit_codes;
use anyhow::{Context, Result};
use inscribe_core::{run_pipeline, DirectoryCatalog, PackConfig, PackConfigOverrides};

/// Layer defaults, config file, environment and flags (later wins).
pub(crate) fn resolve_config(args: &PackArgs) -> Result<PackConfig> {
    let mut cfg = PackConfig::default();
    if let Some(path) = &args.config {
        cfg = cfg.apply(PackConfigOverrides::from_file(path)?);
    }
    cfg = cfg.apply(PackConfigOverrides::from_env()?);
    cfg = cfg.apply(PackConfigOverrides {
        max_batch_size_bytes: args.max_batch_size,
        unit_limit_bytes: args.unit_limit,
        batch_id_prefix: args.prefix.clone(),
        parallel: args.parallel,
        output_dir: args.out.clone(),
    });
    cfg.validate()?;
    Ok(cfg)
}

pub async fn run(args: PackArgs) -> Result<i32> {
    let cfg = resolve_config(&args)?;
    let catalog = DirectoryCatalog::new(&args.catalog);

    let outcome = run_pipeline(&catalog, &cfg)
        .await
        .with_context(|| format!("failed to pack catalog {}", args.catalog.display()))?;
    let m = &outcome.manifest;

    println!("Inscription Batches");
    println!("===================");
    println!(
        "{:<20} {:>7} {:>8} {:>12} {:>12} {:>7}  {}",
        "BATCH", "GROUPS", "ENTRIES", "RAW", "COMPRESSED", "RATIO", "FLAGS"
    );
    for b in &m.batches {
        let mut flags = Vec::new();
        if b.oversized {
            flags.push("OVERSIZED");
        }
        if !b.within_unit_limit {
            flags.push("OVER-UNIT-LIMIT");
        }
        println!(
            "{:<20} {:>7} {:>8} {:>12} {:>12} {:>6.1}%  {}",
            b.batch_id,
            b.included_group_ids.len(),
            b.entry_count,
            b.uncompressed_size_bytes,
            b.compressed_size_bytes,
            b.compression_ratio * 100.0,
            flags.join(",")
        );
    }
    println!();
    println!("Run ID:      {}", m.run_id);
    println!("Root Hash:   {}", m.integrity.root_hash_hex);
    println!(
        "Total:       {} batches, {} groups, {} entries, {} bytes compressed",
        m.stats.total_batches,
        m.stats.total_groups,
        m.stats.total_entries,
        m.stats.total_compressed_size_bytes
    );
    println!("Manifest:    {}", outcome.manifest_path.display());
    if let Some(prev) = &outcome.previous_manifest {
        println!("Previous:    {}", prev.display());
    }

    for v in &outcome.violations {
        eprintln!(
            "warning: group '{}' ({} bytes) exceeds max batch size {}; {} is oversized and needs review",
            v.group_id, v.group_size_bytes, v.max_batch_size_bytes, v.batch_id
        );
    }

    Ok(exit_codes::SUCCESS)
}
