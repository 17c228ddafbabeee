// src/bin/plan_regions.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use poi_linker_lib::{
    config::{self, PipelineConfig},
    planning::RunPlan,
    services::data_fetcher::Registry,
};

/// Estimate embedding volume and cost per region, and write tiered region lists.
#[derive(Debug, Parser)]
#[command(name = "plan_regions")]
struct Args {
    /// Where to write large/medium/small region lists
    #[arg(long, default_value = "region_lists")]
    lists_dir: PathBuf,

    #[arg(long)]
    source_dir: Option<PathBuf>,

    #[arg(long)]
    registry: Option<PathBuf>,

    /// How many of the largest regions to print
    #[arg(long, default_value_t = 20)]
    top: usize,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    config::load_env();

    let pipeline = PipelineConfig::from_env();
    let source_dir = args.source_dir.unwrap_or(pipeline.source_dir);
    let registry_file = args.registry.unwrap_or(pipeline.registry_file);

    let registry = Registry::load(&registry_file).context("Failed to load registry")?;
    let plan = RunPlan::build(&source_dir, &registry)
        .with_context(|| format!("Failed to scan {}", source_dir.display()))?;

    println!("{}", plan.render(args.top));

    let written = plan
        .write_tier_files(&args.lists_dir)
        .context("Failed to write region lists")?;
    info!("Wrote {} region lists to {}", written.len(), args.lists_dir.display());
    Ok(())
}
