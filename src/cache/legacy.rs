// src/cache/legacy.rs

use log::{error, info, warn};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cache::embedding_cache::EmbeddingCache;
use crate::errors::{MatchError, MatchResult};

/// Result of migrating one legacy vector file.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Number of vectors added to the cache (already-cached names are not counted).
    Converted(usize),
    NotFound,
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Converted(n) => write!(f, "converted {}", n),
            StepOutcome::NotFound => write!(f, "no legacy file"),
            StepOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub region: String,
    pub source: StepOutcome,
    pub target: StepOutcome,
    pub cached_total: usize,
}

pub fn legacy_source_path(legacy_dir: &Path, region: &str) -> PathBuf {
    legacy_dir.join(format!("{}_poi_embeddings.json", region))
}

pub fn legacy_target_path(legacy_dir: &Path, region: &str) -> PathBuf {
    legacy_dir.join(format!("{}_company_embeddings.json", region))
}

/// Loads a legacy JSON array of vectors aligned with `names` and appends it to `cache`.
///
/// A length mismatch means the alignment is lost, so nothing from the file is used.
/// The same holds for an empty vector or one whose dimension differs from the rest of the
/// file or from the cache: the file is checked in full before the first insert.
pub fn migrate_vectors(
    cache: &mut EmbeddingCache,
    names: &[String],
    legacy_path: &Path,
) -> MatchResult<usize> {
    let file = File::open(legacy_path)?;
    let vectors: Vec<Vec<f32>> = serde_json::from_reader(BufReader::new(file))?;

    if vectors.len() != names.len() {
        return Err(MatchError::CacheIntegrity(format!(
            "{} holds {} vectors for {} names",
            legacy_path.display(),
            vectors.len(),
            names.len()
        )));
    }

    let dim = match (cache.dimension(), vectors.first()) {
        (0, Some(first)) => first.len(),
        (dim, _) => dim,
    };
    if let Some((row, bad)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.is_empty() || v.len() != dim)
    {
        return Err(MatchError::CacheIntegrity(format!(
            "{} row {} has dimension {}, expected {}",
            legacy_path.display(),
            row,
            bad.len(),
            dim
        )));
    }

    let mut added = 0;
    for (name, vector) in names.iter().zip(vectors.iter()) {
        if cache.insert(name, vector)? {
            added += 1;
        }
    }
    Ok(added)
}

fn run_step(
    cache: &mut EmbeddingCache,
    names: &[String],
    path: &Path,
    kind: &str,
) -> StepOutcome {
    if !path.exists() {
        info!("Region {}: no legacy {} file at {}", cache.region(), kind, path.display());
        return StepOutcome::NotFound;
    }
    let start = Instant::now();
    match migrate_vectors(cache, names, path) {
        Ok(added) => {
            info!(
                "Region {}: added {} legacy {} embeddings in {:.2?}",
                cache.region(),
                added,
                kind,
                start.elapsed()
            );
            StepOutcome::Converted(added)
        }
        Err(e) => {
            error!("Region {}: legacy {} conversion failed: {}", cache.region(), kind, e);
            StepOutcome::Failed(e.to_string())
        }
    }
}

/// Migrates both legacy files of a region into its cache and persists once.
///
/// The source and target steps are independent: a failure in one is reported in the
/// returned `ConversionReport` and does not stop the other.
pub fn convert_region(
    legacy_dir: &Path,
    cache_dir: &Path,
    region: &str,
    source_names: &[String],
    target_names: &[String],
) -> MatchResult<ConversionReport> {
    let mut cache = EmbeddingCache::open(cache_dir, region)?;
    let before = cache.len();

    let source = run_step(
        &mut cache,
        source_names,
        &legacy_source_path(legacy_dir, region),
        "POI",
    );
    let target = run_step(
        &mut cache,
        target_names,
        &legacy_target_path(legacy_dir, region),
        "company",
    );

    if cache.len() > before {
        cache.persist()?;
    } else {
        warn!("Region {}: nothing new to write to the cache", region);
    }

    Ok(ConversionReport {
        region: region.to_string(),
        source,
        target,
        cached_total: cache.len(),
    })
}
