// src/main.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use poi_linker_lib::{
    config::{self, PipelineConfig},
    services::{
        data_fetcher::{load_region_file, validate_regions, Registry},
        embed_services::{EmbeddingService, OpenAIEmbedder},
        retry::ThreadSleeper,
    },
    Classifier, RegionOrchestrator,
};

/// Link unbranded POI names to company-registry entries, one region at a time.
#[derive(Debug, Parser)]
#[command(name = "poi_linker", version)]
struct Args {
    /// Region ids to process, in order
    regions: Vec<String>,

    /// Read region ids from a file (one per line, `#` comments allowed)
    #[arg(long, short = 'f', conflicts_with = "regions")]
    file: Option<PathBuf>,

    /// Directory holding `<region>.csv` source name files
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Registry CSV with `region,company_name` columns
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Classifier artifact (JSON)
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    config::load_env();
    let start_time = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    info!("Starting POI linker run {}", run_id);

    // Region list problems end the run before any region is touched
    let regions = match &args.file {
        Some(path) => load_region_file(path)?,
        None if args.regions.is_empty() => bail!("no regions given: pass region ids or --file"),
        None => validate_regions(&args.regions)?,
    };

    let mut pipeline = PipelineConfig::from_env();
    if let Some(dir) = args.source_dir {
        pipeline.source_dir = dir;
    }
    if let Some(file) = args.registry {
        pipeline.registry_file = file;
    }
    if let Some(file) = args.model {
        pipeline.model_file = file;
    }
    if let Some(dir) = args.cache_dir {
        pipeline.cache_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        pipeline.output_dir = dir;
    }

    let classifier = Classifier::load(&pipeline.model_file, pipeline.matching.prediction_threshold)
        .context("Failed to load classifier artifact")?;
    let registry = Registry::load(&pipeline.registry_file).context("Failed to load registry")?;
    let embedder = OpenAIEmbedder::from_config(&pipeline.embedding)
        .context("Failed to set up embedding client")?;
    let sleeper = ThreadSleeper;
    let service = EmbeddingService::from_config(&embedder, &sleeper, &pipeline.embedding);

    let orchestrator = RegionOrchestrator::new(&pipeline, &registry, &classifier, service);
    let report = orchestrator.run_regions_with_id(&run_id, &regions);
    report.print();

    info!(
        "Run {} complete in {:.2?}; summary at {}",
        run_id,
        start_time.elapsed(),
        pipeline.summary_path().display()
    );
    Ok(())
}
