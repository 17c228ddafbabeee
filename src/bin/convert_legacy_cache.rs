// src/bin/convert_legacy_cache.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use poi_linker_lib::{
    cache::legacy::{convert_region, StepOutcome},
    config::{self, PipelineConfig},
    services::data_fetcher::{load_region_file, load_source_names, validate_regions, Registry},
    MatchError,
};

/// Migrate per-kind JSON embedding caches into the region cache format.
#[derive(Debug, Parser)]
#[command(name = "convert_legacy_cache")]
struct Args {
    /// Directory with `<region>_poi_embeddings.json` / `<region>_company_embeddings.json`
    #[arg(long)]
    legacy_dir: PathBuf,

    regions: Vec<String>,

    #[arg(long, short = 'f', conflicts_with = "regions")]
    file: Option<PathBuf>,

    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    config::load_env();

    let pipeline = PipelineConfig::from_env();
    let cache_dir = args.cache_dir.unwrap_or_else(|| pipeline.cache_dir.clone());
    let regions = match &args.file {
        Some(path) => load_region_file(path)?,
        None => validate_regions(&args.regions)?,
    };
    let registry = Registry::load(&pipeline.registry_file).context("Failed to load registry")?;

    let mut failed_steps = 0;
    for region in &regions {
        let sources = match load_source_names(&pipeline.source_path(region), region) {
            Ok(names) => names,
            Err(MatchError::MissingInput { reason, .. }) => {
                info!("Region {}: {}; converting registry vectors only", region, reason);
                Vec::new()
            }
            Err(e) => {
                error!("Region {}: {}", region, e);
                failed_steps += 1;
                continue;
            }
        };

        let targets = registry.targets(region);
        match convert_region(&args.legacy_dir, &cache_dir, region, &sources, targets) {
            Ok(report) => {
                println!(
                    "{}: POI {}, company {}, {} cached",
                    report.region, report.source, report.target, report.cached_total
                );
                failed_steps += [&report.source, &report.target]
                    .iter()
                    .filter(|s| matches!(s, StepOutcome::Failed(_)))
                    .count();
            }
            Err(e) => {
                error!("Region {}: conversion aborted: {}", region, e);
                failed_steps += 1;
            }
        }
    }

    info!(
        "Converted {} regions into {} ({} failed steps)",
        regions.len(),
        cache_dir.display(),
        failed_steps
    );
    Ok(())
}
