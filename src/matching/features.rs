// src/matching/features.rs

use std::collections::{HashMap, HashSet};
use strsim::jaro_winkler;

use crate::errors::{MatchError, MatchResult};
use crate::matching::candidates::SimilarityCandidate;
use crate::matching::name::normalize;

/// Feature names in the order the classifier was trained with.
pub const FEATURE_NAMES: [&str; 5] = [
    "cos_sim",
    "jaro_winkler",
    "jaro_winkler_norm",
    "token_jaccard",
    "contains_match",
];

/// Similarity features for one candidate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairFeatures {
    pub cos_sim: f64,
    pub jaro_winkler: f64,
    pub jaro_winkler_norm: f64,
    pub token_jaccard: f64,
    pub contains_match: f64,
}

impl PairFeatures {
    pub fn get(&self, feature: &str) -> Option<f64> {
        match feature {
            "cos_sim" => Some(self.cos_sim),
            "jaro_winkler" => Some(self.jaro_winkler),
            "jaro_winkler_norm" => Some(self.jaro_winkler_norm),
            "token_jaccard" => Some(self.token_jaccard),
            "contains_match" => Some(self.contains_match),
            _ => None,
        }
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.cos_sim,
            self.jaro_winkler,
            self.jaro_winkler_norm,
            self.token_jaccard,
            self.contains_match,
        ]
    }

    /// Values in an arbitrary order, e.g. the one stored in the classifier artifact.
    pub fn ordered(&self, order: &[String]) -> MatchResult<Vec<f64>> {
        order
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| MatchError::InvalidInput(format!("unknown feature '{}'", name)))
            })
            .collect()
    }
}

/// Candidate pair with its lexical features attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeaturedCandidate {
    pub source_index: usize,
    pub target_index: usize,
    pub features: PairFeatures,
}

/// Computes the lexical features for every candidate.
///
/// Normalized names are computed once per distinct name rather than once per pair.
pub fn compute_features(
    candidates: &[SimilarityCandidate],
    source_names: &[String],
    target_names: &[String],
) -> Vec<FeaturedCandidate> {
    let mut source_norm: HashMap<usize, String> = HashMap::new();
    let mut target_norm: HashMap<usize, String> = HashMap::new();

    candidates
        .iter()
        .map(|c| {
            let source = &source_names[c.source_index];
            let target = &target_names[c.target_index];
            let source_n = source_norm
                .entry(c.source_index)
                .or_insert_with(|| normalize(source))
                .clone();
            let target_n = target_norm
                .entry(c.target_index)
                .or_insert_with(|| normalize(target));

            FeaturedCandidate {
                source_index: c.source_index,
                target_index: c.target_index,
                features: PairFeatures {
                    cos_sim: c.cosine_similarity as f64,
                    jaro_winkler: jaro_winkler(source, target),
                    jaro_winkler_norm: jaro_winkler(&source_n, target_n),
                    token_jaccard: token_jaccard(source, target),
                    contains_match: contains_match(source, target),
                },
            }
        })
        .collect()
}

/// Intersection over union of lowercase whitespace tokens. 0.0 when either side is empty.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = a.split_whitespace().map(|t| t.to_lowercase()).collect();
    let tokens_b: HashSet<String> = b.split_whitespace().map(|t| t.to_lowercase()).collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// 1.0 when either lowercase name contains the other.
pub fn contains_match(a: &str, b: &str) -> f64 {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a.contains(&b) || b.contains(&a) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_jaccard() {
        assert!((token_jaccard("ABC Pizza", "abc pizza llc") - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(token_jaccard("", "abc"), 0.0);
        assert_eq!(token_jaccard("same thing", "Thing Same"), 1.0);
    }

    #[test]
    fn test_contains_match() {
        assert_eq!(contains_match("ABC Pizza", "abc pizza llc"), 1.0);
        assert_eq!(contains_match("First Baptist Church Inc", "first baptist"), 1.0);
        assert_eq!(contains_match("XYZ", "ABC"), 0.0);
    }

    #[test]
    fn test_compute_features_order_and_values() {
        let sources = vec!["ABC Pizza".to_string()];
        let targets = vec!["ABC Pizza LLC".to_string()];
        let candidates = vec![SimilarityCandidate {
            source_index: 0,
            target_index: 0,
            cosine_similarity: 0.88,
        }];

        let featured = compute_features(&candidates, &sources, &targets);
        assert_eq!(featured.len(), 1);
        let f = featured[0].features;
        assert!((f.cos_sim - 0.88).abs() < 1e-6);
        // "abc pizza" vs "abc pizza" after suffix stripping
        assert!((f.jaro_winkler_norm - 1.0).abs() < 1e-12);
        assert!(f.jaro_winkler < 1.0 && f.jaro_winkler > 0.8);
        assert_eq!(f.contains_match, 1.0);

        let arr = f.as_array();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            assert_eq!(f.get(name), Some(arr[i]));
        }
    }

    #[test]
    fn test_long_shared_prefix_is_not_a_perfect_score() {
        let sources = vec!["First Baptist Church of Dublin".to_string()];
        let targets = vec!["First Baptist Church of Columbus".to_string()];
        let candidates = vec![SimilarityCandidate {
            source_index: 0,
            target_index: 0,
            cosine_similarity: 0.9,
        }];

        let f = compute_features(&candidates, &sources, &targets)[0].features;
        assert!(f.jaro_winkler < 0.99, "jaro_winkler = {}", f.jaro_winkler);
        assert!(f.jaro_winkler_norm < 0.99, "jaro_winkler_norm = {}", f.jaro_winkler_norm);

        // prefix boost is capped at four characters
        let jaro = strsim::jaro(&sources[0], &targets[0]);
        assert!((f.jaro_winkler - (jaro + 0.4 * (1.0 - jaro))).abs() < 1e-12);
    }

    #[test]
    fn test_no_prefix_boost_for_weak_jaro() {
        let (a, b) = ("abzzzzzz", "abyyyyyy");
        let jaro = strsim::jaro(a, b);
        assert!(jaro <= 0.7);
        assert_eq!(jaro_winkler(a, b), jaro);
    }

    #[test]
    fn test_ordered_follows_requested_order() {
        let f = PairFeatures {
            cos_sim: 0.1,
            jaro_winkler: 0.2,
            jaro_winkler_norm: 0.3,
            token_jaccard: 0.4,
            contains_match: 1.0,
        };
        let order = vec!["contains_match".to_string(), "cos_sim".to_string()];
        assert_eq!(f.ordered(&order).unwrap(), vec![1.0, 0.1]);
        assert!(f.ordered(&["nope".to_string()]).is_err());
    }
}
