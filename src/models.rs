// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::STATUS_MESSAGE_MAX_CHARS;

/// One accepted link from a source (POI) name to its best registry name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkRecord {
    pub source_name: String,
    pub target_name: String,
    pub match_probability: f64,
    pub cosine_similarity: f64,
    pub normalized_lexical_similarity: f64,
    pub region: String,
}

/// Outcome of one region, as written to the summary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionStatus {
    Success,
    Skipped(String),
    Error(String),
}

impl RegionStatus {
    /// Builds an error status with the message cut to `STATUS_MESSAGE_MAX_CHARS` characters.
    pub fn error(message: &str) -> Self {
        RegionStatus::Error(truncate_chars(message, STATUS_MESSAGE_MAX_CHARS))
    }

    pub fn skipped(reason: &str) -> Self {
        RegionStatus::Skipped(truncate_chars(reason, STATUS_MESSAGE_MAX_CHARS))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RegionStatus::Success)
    }

    pub fn parse(raw: &str) -> Self {
        if raw == "success" {
            RegionStatus::Success
        } else if let Some(reason) = raw.strip_prefix("skipped: ") {
            RegionStatus::Skipped(reason.to_string())
        } else if let Some(message) = raw.strip_prefix("error: ") {
            RegionStatus::Error(message.to_string())
        } else {
            RegionStatus::Error(raw.to_string())
        }
    }
}

impl fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionStatus::Success => write!(f, "success"),
            RegionStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
            RegionStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// One row of the cross-region processing summary. Keyed by `region`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region: String,
    pub n_source_names: usize,
    pub n_matched: usize,
    pub match_rate: f64,
    pub status: String,
    pub processed_at: String,
}

impl RegionSummary {
    pub fn new(
        region: &str,
        n_source_names: usize,
        n_matched: usize,
        status: &RegionStatus,
    ) -> Self {
        let match_rate = if n_source_names > 0 {
            n_matched as f64 / n_source_names as f64
        } else {
            0.0
        };
        Self {
            region: region.to_string(),
            n_source_names,
            n_matched,
            match_rate,
            status: status.to_string(),
            processed_at: chrono::Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn status(&self) -> RegionStatus {
        RegionStatus::parse(&self.status)
    }
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
