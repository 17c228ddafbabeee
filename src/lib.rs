// src/lib.rs
pub mod cache;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod matching;
pub mod models;
pub mod orchestrator;
pub mod planning;
pub mod results;
pub mod services;

// Re-export common types for easier access
pub use cache::EmbeddingCache;
pub use classifier::Classifier;
pub use config::PipelineConfig;
pub use errors::{MatchError, MatchResult};
pub use models::{CrosswalkRecord, RegionStatus, RegionSummary};
pub use orchestrator::RegionOrchestrator;
pub use results::{RegionOutcome, RegionState, RunReport};
