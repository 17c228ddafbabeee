// src/matching/selection.rs

use std::collections::HashMap;

use crate::matching::features::PairFeatures;

/// A candidate pair after classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub source_index: usize,
    pub target_index: usize,
    pub features: PairFeatures,
    pub match_probability: f64,
    pub predicted_match: bool,
}

/// Keeps the highest-probability predicted match for each source name.
///
/// Ties go to the candidate encountered first. Output follows the order in which each
/// source first shows up among the accepted candidates.
pub fn select_best_matches(candidates: &[ScoredCandidate]) -> Vec<ScoredCandidate> {
    let mut best: Vec<ScoredCandidate> = Vec::new();
    let mut slot_by_source: HashMap<usize, usize> = HashMap::new();

    for candidate in candidates.iter().filter(|c| c.predicted_match) {
        match slot_by_source.get(&candidate.source_index) {
            Some(&slot) => {
                // strictly greater keeps the first of equal scores
                if candidate.match_probability > best[slot].match_probability {
                    best[slot] = *candidate;
                }
            }
            None => {
                slot_by_source.insert(candidate.source_index, best.len());
                best.push(*candidate);
            }
        }
    }

    best
}
