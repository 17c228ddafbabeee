// src/classifier.rs

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{MatchError, MatchResult};
use crate::matching::features::{FeaturedCandidate, FEATURE_NAMES};
use crate::matching::selection::ScoredCandidate;

/// On-disk form of the pretrained match model.
///
/// `features` is the exact column order used at training time; `coefficients[i]`
/// belongs to `features[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub version: Option<String>,
}

/// Logistic match scorer. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Classifier {
    feature_order: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
    cutoff: f64,
}

impl Classifier {
    /// Loads and validates the artifact. Any problem here is fatal for the whole run.
    pub fn load(path: &Path, cutoff: f64) -> MatchResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MatchError::ArtifactLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact: ClassifierArtifact = serde_json::from_str(&raw).map_err(|e| {
            MatchError::ArtifactLoad(format!("cannot parse {}: {}", path.display(), e))
        })?;
        let classifier = Self::from_artifact(artifact, cutoff)?;
        info!(
            "Loaded classifier from {} with features {:?}",
            path.display(),
            classifier.feature_order()
        );
        Ok(classifier)
    }

    pub fn from_artifact(artifact: ClassifierArtifact, cutoff: f64) -> MatchResult<Self> {
        if artifact.features.is_empty() {
            return Err(MatchError::ArtifactLoad("artifact lists no features".to_string()));
        }
        if artifact.features.len() != artifact.coefficients.len() {
            return Err(MatchError::ArtifactLoad(format!(
                "{} features but {} coefficients",
                artifact.features.len(),
                artifact.coefficients.len()
            )));
        }

        let mut seen = HashSet::new();
        for feature in &artifact.features {
            if !FEATURE_NAMES.contains(&feature.as_str()) {
                return Err(MatchError::ArtifactLoad(format!(
                    "unknown feature '{}' (known: {:?})",
                    feature, FEATURE_NAMES
                )));
            }
            if !seen.insert(feature.as_str()) {
                return Err(MatchError::ArtifactLoad(format!("duplicate feature '{}'", feature)));
            }
        }

        if !artifact.intercept.is_finite() || artifact.coefficients.iter().any(|w| !w.is_finite()) {
            return Err(MatchError::ArtifactLoad("non-finite model weights".to_string()));
        }
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(MatchError::ArtifactLoad(format!(
                "prediction cutoff {} outside [0, 1]",
                cutoff
            )));
        }

        Ok(Self {
            feature_order: artifact.features,
            weights: artifact.coefficients,
            intercept: artifact.intercept,
            cutoff,
        })
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Match probability for each row. Rows must follow `feature_order()`.
    pub fn score(&self, rows: &[Vec<f64>]) -> MatchResult<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.weights.len() {
                    return Err(MatchError::InvalidInput(format!(
                        "feature row has {} values, model expects {}",
                        row.len(),
                        self.weights.len()
                    )));
                }
                let z = self.intercept
                    + row
                        .iter()
                        .zip(self.weights.iter())
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                Ok(sigmoid(z))
            })
            .collect()
    }

    pub fn is_match(&self, probability: f64) -> bool {
        probability >= self.cutoff
    }

    /// Builds rows in artifact order, scores them and applies the cutoff.
    pub fn classify(&self, candidates: &[FeaturedCandidate]) -> MatchResult<Vec<ScoredCandidate>> {
        let rows = candidates
            .iter()
            .map(|c| c.features.ordered(&self.feature_order))
            .collect::<MatchResult<Vec<_>>>()?;
        let probabilities = self.score(&rows)?;

        Ok(candidates
            .iter()
            .zip(probabilities)
            .map(|(c, p)| ScoredCandidate {
                source_index: c.source_index,
                target_index: c.target_index,
                features: c.features,
                match_probability: p,
                predicted_match: self.is_match(p),
            })
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
