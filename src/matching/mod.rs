// src/matching/mod.rs
pub mod candidates;
pub mod features;
pub mod name;
pub mod selection;

pub use candidates::{generate_candidates, CandidateGenerator, SimilarityCandidate};
pub use features::{compute_features, FeaturedCandidate, PairFeatures, FEATURE_NAMES};
pub use name::{normalize, sanitize, sanitize_opt, unique_sanitized};
pub use selection::{select_best_matches, ScoredCandidate};
