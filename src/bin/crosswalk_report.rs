// src/bin/crosswalk_report.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use poi_linker_lib::{
    config::{self, PipelineConfig},
    results::CrosswalkProfile,
    services::{data_fetcher::validate_regions, data_writer::read_crosswalk},
};

/// Print the match-probability profile of a saved region crosswalk.
#[derive(Debug, Parser)]
#[command(name = "crosswalk_report")]
struct Args {
    region: String,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Rows shown per confidence band
    #[arg(long, default_value_t = 10)]
    samples: usize,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();
    config::load_env();

    let mut pipeline = PipelineConfig::from_env();
    if let Some(dir) = args.output_dir {
        pipeline.output_dir = dir;
    }
    validate_regions([&args.region])?;
    let path = pipeline.crosswalk_path(&args.region);
    let records = read_crosswalk(&path)
        .with_context(|| format!("Failed to read crosswalk {}", path.display()))?;

    let profile = CrosswalkProfile::from_records(&records, args.samples);
    println!("{}", profile.render(&args.region));
    Ok(())
}
