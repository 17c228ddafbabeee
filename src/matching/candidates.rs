// src/matching/candidates.rs

use candle_core::{Device, Tensor};
use log::{debug, info};
use std::time::Instant;

use crate::config::MatchingConfig;
use crate::errors::{MatchError, MatchResult};

/// A (source, target) pair whose cosine similarity cleared the threshold.
/// Indices point into the name lists handed to `CandidateGenerator::generate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityCandidate {
    pub source_index: usize,
    pub target_index: usize,
    pub cosine_similarity: f32,
}

/// Thresholded cosine-similarity search between two vector sets.
///
/// When the full `|S| x |T|` matrix would exceed `max_matrix_cells`, the larger set is
/// multiplied in row blocks so only one block of similarities is alive at a time.
pub struct CandidateGenerator {
    threshold: f32,
    max_matrix_cells: usize,
    device: Device,
}

impl CandidateGenerator {
    pub fn new(threshold: f32, max_matrix_cells: usize) -> Self {
        Self {
            threshold,
            max_matrix_cells: max_matrix_cells.max(1),
            device: Device::Cpu,
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.similarity_threshold, config.max_matrix_cells)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn generate(
        &self,
        source_names: &[String],
        source_vectors: &[Vec<f32>],
        target_names: &[String],
        target_vectors: &[Vec<f32>],
    ) -> MatchResult<Vec<SimilarityCandidate>> {
        if source_names.len() != source_vectors.len() || target_names.len() != target_vectors.len()
        {
            return Err(MatchError::InvalidInput(format!(
                "name/vector count mismatch: {} source names vs {} vectors, {} target names vs {} vectors",
                source_names.len(),
                source_vectors.len(),
                target_names.len(),
                target_vectors.len()
            )));
        }
        if source_vectors.is_empty() || target_vectors.is_empty() {
            return Ok(Vec::new());
        }

        let dim = common_dimension(source_vectors, target_vectors)?;
        let start = Instant::now();

        let source_unit = normalize_rows(source_vectors);
        let target_unit = normalize_rows(target_vectors);

        // Block over whichever side is larger; the smaller side stays resident.
        let source_is_outer = source_unit.len() >= target_unit.len();
        let (outer, inner) = if source_is_outer {
            (&source_unit, &target_unit)
        } else {
            (&target_unit, &source_unit)
        };

        let total_cells = outer.len().saturating_mul(inner.len());
        let block_rows = if total_cells <= self.max_matrix_cells {
            outer.len()
        } else {
            (self.max_matrix_cells / inner.len()).max(1)
        };

        info!(
            "Computing similarity matrix ({} x {}) in blocks of {} rows",
            source_unit.len(),
            target_unit.len(),
            block_rows
        );

        let inner_t = Tensor::from_vec(flatten(inner), (inner.len(), dim), &self.device)?
            .t()?
            .contiguous()?;

        let mut candidates = Vec::new();
        for (block_idx, chunk) in outer.chunks(block_rows).enumerate() {
            let offset = block_idx * block_rows;
            let block = Tensor::from_vec(flatten(chunk), (chunk.len(), dim), &self.device)?;
            let sims = block.matmul(&inner_t)?.to_vec2::<f32>()?;

            for (row, row_sims) in sims.iter().enumerate() {
                for (col, &sim) in row_sims.iter().enumerate() {
                    if sim.is_nan() || sim < self.threshold {
                        continue;
                    }
                    let (source_index, target_index) = if source_is_outer {
                        (offset + row, col)
                    } else {
                        (col, offset + row)
                    };
                    candidates.push(SimilarityCandidate {
                        source_index,
                        target_index,
                        cosine_similarity: sim.clamp(-1.0, 1.0),
                    });
                }
            }
            debug!(
                "Block {} done, {} candidates so far",
                block_idx + 1,
                candidates.len()
            );
        }

        candidates.sort_unstable_by_key(|c| (c.source_index, c.target_index));

        info!(
            "Found {} candidate pairs above {} threshold in {:.2?}",
            candidates.len(),
            self.threshold,
            start.elapsed()
        );
        Ok(candidates)
    }
}

/// One-shot form of `CandidateGenerator::generate` using the thresholds in `config`.
pub fn generate_candidates(
    source_names: &[String],
    source_vectors: &[Vec<f32>],
    target_names: &[String],
    target_vectors: &[Vec<f32>],
    config: &MatchingConfig,
) -> MatchResult<Vec<SimilarityCandidate>> {
    CandidateGenerator::from_config(config).generate(
        source_names,
        source_vectors,
        target_names,
        target_vectors,
    )
}

/// Scales every row to unit length. All-zero rows are left as zeros.
pub fn normalize_rows(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    vectors
        .iter()
        .map(|v| {
            let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
            if norm == 0.0 || !norm.is_finite() {
                vec![0.0; v.len()]
            } else {
                v.iter().map(|x| (*x as f64 / norm) as f32).collect()
            }
        })
        .collect()
}

fn flatten(rows: &[Vec<f32>]) -> Vec<f32> {
    rows.iter().flat_map(|r| r.iter().copied()).collect()
}

fn common_dimension(a: &[Vec<f32>], b: &[Vec<f32>]) -> MatchResult<usize> {
    let dim = a[0].len();
    if dim == 0 {
        return Err(MatchError::InvalidInput("vectors must not be empty".to_string()));
    }
    if let Some(bad) = a.iter().chain(b.iter()).find(|v| v.len() != dim) {
        return Err(MatchError::InvalidInput(format!(
            "vector dimension mismatch: expected {}, found {}",
            dim,
            bad.len()
        )));
    }
    Ok(dim)
}
