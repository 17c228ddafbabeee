// src/errors.rs

use thiserror::Error;

/// Errors raised by the linking pipeline.
///
/// Region-level failures are caught by the orchestrator and recorded in the
/// processing summary; `ArtifactLoad` and `InvalidRegionList` are raised before
/// any region runs and end the whole run.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A single embedding call failed (network, HTTP status, malformed body).
    #[error("embedding service error: {0}")]
    TransientService(String),

    #[error("embedding batch {batch} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        batch: usize,
        attempts: u32,
        last_error: String,
    },

    /// No source names or no registry entries for a region. Not a failure.
    #[error("missing input for region {region}: {reason}")]
    MissingInput { region: String, reason: String },

    #[error("cache integrity error: {0}")]
    CacheIntegrity(String),

    #[error("classifier artifact error: {0}")]
    ArtifactLoad(String),

    #[error("invalid region list: {0}")]
    InvalidRegionList(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("similarity computation failed: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl MatchError {
    pub fn is_missing_input(&self) -> bool {
        matches!(self, MatchError::MissingInput { .. })
    }
}

pub type MatchResult<T> = std::result::Result<T, MatchError>;
