// src/orchestrator.rs

use log::{error, info, warn};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::EmbeddingCache;
use crate::classifier::Classifier;
use crate::config::PipelineConfig;
use crate::errors::{MatchError, MatchResult};
use crate::matching::{compute_features, select_best_matches, CandidateGenerator};
use crate::models::{CrosswalkRecord, RegionStatus, RegionSummary};
use crate::results::{RegionOutcome, RegionState, RunReport};
use crate::services::data_fetcher::{load_source_names, Registry};
use crate::services::data_writer::{remove_crosswalk, upsert_summary, write_crosswalk};
use crate::services::embed_services::EmbeddingService;

/// Drives regions through load -> embed -> candidates -> classify -> select -> save.
///
/// Holds only run-wide, read-only collaborators; every region gets a fresh cache.
pub struct RegionOrchestrator<'a> {
    config: &'a PipelineConfig,
    registry: &'a Registry,
    classifier: &'a Classifier,
    embedder: EmbeddingService<'a>,
    generator: CandidateGenerator,
}

// Mutable bookkeeping for the region in flight
struct Progress {
    state: RegionState,
    n_source_names: usize,
}

impl Progress {
    fn advance(&mut self, region: &str, next: RegionState, start: Instant) {
        info!(
            "Region {}: {:?} -> {:?} ({:.2?} elapsed)",
            region,
            self.state,
            next,
            start.elapsed()
        );
        self.state = next;
    }
}

impl<'a> RegionOrchestrator<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        registry: &'a Registry,
        classifier: &'a Classifier,
        embedder: EmbeddingService<'a>,
    ) -> Self {
        Self {
            config,
            registry,
            classifier,
            embedder,
            generator: CandidateGenerator::from_config(&config.matching),
        }
    }

    /// Processes every region in order. A failing region never stops the loop.
    pub fn run_regions(&self, regions: &[String]) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        self.run_regions_with_id(&run_id, regions)
    }

    pub fn run_regions_with_id(&self, run_id: &str, regions: &[String]) -> RunReport {
        let start = Instant::now();
        info!("Run {}: processing {} regions", run_id, regions.len());

        let mut outcomes = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            info!("Run {}: region {}/{}: {}", run_id, i + 1, regions.len(), region);
            outcomes.push(self.process_region(region));
        }

        RunReport {
            run_id: run_id.to_string(),
            outcomes,
            elapsed: start.elapsed(),
        }
    }

    /// Runs one region end to end and records its summary row.
    ///
    /// Missing input ends in `Skipped` with zero counts; any other error ends in `Failed`
    /// with the message recorded as `error: ...`.
    pub fn process_region(&self, region: &str) -> RegionOutcome {
        let start = Instant::now();
        let mut progress = Progress {
            state: RegionState::Unstarted,
            n_source_names: 0,
        };

        let result = self.run_stages(region, &mut progress, start);
        let (state, status, n_source_names, n_matched) = match result {
            Ok(n_matched) => (
                RegionState::CrosswalkSaved,
                RegionStatus::Success,
                progress.n_source_names,
                n_matched,
            ),
            Err(MatchError::MissingInput { reason, .. }) => {
                warn!("Region {}: skipped, {}", region, reason);
                self.clear_stale_crosswalk(region);
                (RegionState::Skipped, RegionStatus::skipped(&reason), 0, 0)
            }
            Err(e) => {
                error!("Region {}: failed during {:?}: {}", region, progress.state, e);
                (
                    RegionState::Failed,
                    RegionStatus::error(&e.to_string()),
                    progress.n_source_names,
                    0,
                )
            }
        };

        let summary = RegionSummary::new(region, n_source_names, n_matched, &status);
        if let Err(e) = upsert_summary(&self.config.summary_path(), &summary) {
            error!("Region {}: could not update processing summary: {}", region, e);
        }

        info!(
            "Region {}: {} ({}/{} matched) in {:.2?}",
            region,
            status,
            n_matched,
            n_source_names,
            start.elapsed()
        );

        RegionOutcome {
            region: region.to_string(),
            state,
            reached: progress.state,
            status,
            n_source_names,
            n_matched,
            elapsed: start.elapsed(),
        }
    }

    // A skipped region has no current matches, so output from an earlier run must go
    fn clear_stale_crosswalk(&self, region: &str) {
        let path = self.config.crosswalk_path(region);
        match remove_crosswalk(&path) {
            Ok(true) => info!("Region {}: removed stale crosswalk {}", region, path.display()),
            Ok(false) => {}
            Err(e) => error!("Region {}: could not remove {}: {}", region, path.display(), e),
        }
    }

    fn run_stages(
        &self,
        region: &str,
        progress: &mut Progress,
        start: Instant,
    ) -> MatchResult<usize> {
        let source_names = load_source_names(&self.config.source_path(region), region)?;
        let target_names = self.registry.targets(region);
        if source_names.is_empty() {
            return Err(MatchError::MissingInput {
                region: region.to_string(),
                reason: "no source names".to_string(),
            });
        }
        if !self.registry.has_region(region) {
            return Err(MatchError::MissingInput {
                region: region.to_string(),
                reason: "no registry entries".to_string(),
            });
        }
        progress.n_source_names = source_names.len();
        info!(
            "Region {}: {} source names, {} registry names",
            region,
            source_names.len(),
            target_names.len()
        );
        progress.advance(region, RegionState::NamesLoaded, start);

        let (source_vectors, target_vectors) =
            self.resolve_embeddings(region, &source_names, target_names)?;
        progress.advance(region, RegionState::EmbeddingsResolved, start);

        let candidates = self.generator.generate(
            &source_names,
            &source_vectors,
            target_names,
            &target_vectors,
        )?;
        drop(source_vectors);
        drop(target_vectors);
        info!(
            "Region {}: {} candidate pairs at cosine >= {:.2}",
            region,
            candidates.len(),
            self.generator.threshold()
        );
        progress.advance(region, RegionState::CandidatesGenerated, start);

        let featured = compute_features(&candidates, &source_names, target_names);
        let scored = self.classifier.classify(&featured)?;
        let predicted = scored.iter().filter(|c| c.predicted_match).count();
        info!(
            "Region {}: {} pairs at probability >= {:.2}",
            region,
            predicted,
            self.classifier.cutoff()
        );
        progress.advance(region, RegionState::Classified, start);

        let records: Vec<CrosswalkRecord> = select_best_matches(&scored)
            .into_iter()
            .map(|c| CrosswalkRecord {
                source_name: source_names[c.source_index].clone(),
                target_name: target_names[c.target_index].clone(),
                match_probability: c.match_probability,
                cosine_similarity: c.features.cos_sim,
                normalized_lexical_similarity: c.features.jaro_winkler_norm,
                region: region.to_string(),
            })
            .collect();

        write_crosswalk(&self.config.crosswalk_path(region), &records)?;
        progress.advance(region, RegionState::CrosswalkSaved, start);
        Ok(records.len())
    }

    /// Resolves source and target vectors through the region cache in one pass over
    /// the union of both name sets (first-appearance order).
    ///
    /// `source_names` must be distinct; they then occupy the head of the union and keep
    /// their vectors in place. Target vectors are moved out of the tail, and only names
    /// shared with the source side are copied.
    fn resolve_embeddings(
        &self,
        region: &str,
        source_names: &[String],
        target_names: &[String],
    ) -> MatchResult<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let mut union: Vec<String> = Vec::with_capacity(source_names.len() + target_names.len());
        let mut position: HashMap<&str, usize> = HashMap::new();
        for name in source_names.iter().chain(target_names.iter()) {
            if !position.contains_key(name.as_str()) {
                position.insert(name.as_str(), union.len());
                union.push(name.clone());
            }
        }

        if union.len() < source_names.len() {
            return Err(MatchError::InvalidInput(format!(
                "region {}: source names are not distinct",
                region
            )));
        }

        let mut cache = EmbeddingCache::open(&self.config.cache_dir, region)?;
        let mut source_vectors = cache.get_vectors(&union, &self.embedder)?;
        drop(cache);

        let mut tail: Vec<Option<Vec<f32>>> = source_vectors
            .split_off(source_names.len())
            .into_iter()
            .map(Some)
            .collect();

        let target_vectors = target_names
            .iter()
            .map(|n| {
                let missing = || MatchError::CacheIntegrity(format!("no vector for '{}'", n));
                let i = *position.get(n.as_str()).ok_or_else(missing)?;
                if i < source_vectors.len() {
                    Ok(source_vectors[i].clone())
                } else {
                    tail.get_mut(i - source_vectors.len())
                        .and_then(Option::take)
                        .ok_or_else(missing)
                }
            })
            .collect::<MatchResult<Vec<_>>>()?;

        Ok((source_vectors, target_vectors))
    }
}
