// src/config.rs

use log::{info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// Cosine similarity a pair needs before it is scored at all
pub const SIMILARITY_THRESHOLD: f32 = 0.50;

// Classifier probability at or above which a pair counts as a match
pub const PREDICTION_THRESHOLD: f64 = 0.4;

// Upper bound on similarity cells held in memory at once (~200 MB of f32)
pub const MAX_MATRIX_CELLS: usize = 50_000_000;

// Names are capped before they are sent to the embedding service
pub const MAX_NAME_CHARS: usize = 8000;

pub const EMBEDDING_MODEL: &str = "text-embedding-3-large";
pub const EMBEDDING_API_URL: &str = "https://api.openai.com/v1/embeddings";
pub const EMBEDDING_BATCH_SIZE: usize = 2000;
pub const EMBEDDING_MAX_ATTEMPTS: u32 = 3;
pub const EMBEDDING_BACKOFF_SECS: u64 = 5;
pub const EMBEDDING_BATCH_PAUSE_MS: u64 = 100;
pub const EMBEDDING_REQUEST_TIMEOUT_SECS: u64 = 120;

// Summary status messages are cut to this many characters
pub const STATUS_MESSAGE_MAX_CHARS: usize = 100;

pub const SUMMARY_FILE_NAME: &str = "processing_summary.csv";

/// Settings for talking to the embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub batch_pause: Duration,
    pub request_timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: EMBEDDING_MODEL.to_string(),
            api_url: EMBEDDING_API_URL.to_string(),
            batch_size: EMBEDDING_BATCH_SIZE,
            max_attempts: EMBEDDING_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(EMBEDDING_BACKOFF_SECS),
            batch_pause: Duration::from_millis(EMBEDDING_BATCH_PAUSE_MS),
            request_timeout: Duration::from_secs(EMBEDDING_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Thresholds used while turning vectors into accepted matches.
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub similarity_threshold: f32,
    pub prediction_threshold: f64,
    pub max_matrix_cells: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: SIMILARITY_THRESHOLD,
            prediction_threshold: PREDICTION_THRESHOLD,
            max_matrix_cells: MAX_MATRIX_CELLS,
        }
    }
}

/// Everything a run needs: input/output locations plus tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub registry_file: PathBuf,
    pub model_file: PathBuf,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub matching: MatchingConfig,
}

impl PipelineConfig {
    /// Reads environment variables, falling back to defaults under `./data`.
    pub fn from_env() -> Self {
        let embedding = EmbeddingConfig {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: env_or("EMBEDDING_MODEL", EMBEDDING_MODEL.to_string()),
            api_url: env_or("EMBEDDING_API_URL", EMBEDDING_API_URL.to_string()),
            batch_size: env_parse("EMBEDDING_BATCH_SIZE", EMBEDDING_BATCH_SIZE).max(1),
            max_attempts: env_parse("EMBEDDING_MAX_ATTEMPTS", EMBEDDING_MAX_ATTEMPTS).max(1),
            backoff_base: Duration::from_secs(env_parse(
                "EMBEDDING_BACKOFF_SECS",
                EMBEDDING_BACKOFF_SECS,
            )),
            batch_pause: Duration::from_millis(env_parse(
                "EMBEDDING_BATCH_PAUSE_MS",
                EMBEDDING_BATCH_PAUSE_MS,
            )),
            request_timeout: Duration::from_secs(EMBEDDING_REQUEST_TIMEOUT_SECS),
        };

        let matching = MatchingConfig {
            similarity_threshold: env_parse("SIMILARITY_THRESHOLD", SIMILARITY_THRESHOLD),
            prediction_threshold: env_parse("PREDICTION_THRESHOLD", PREDICTION_THRESHOLD),
            max_matrix_cells: env_parse("MAX_MATRIX_CELLS", MAX_MATRIX_CELLS).max(1),
        };

        let config = Self {
            source_dir: env_path("POI_NAMES_DIR", "data/poi_names"),
            registry_file: env_path("REGISTRY_FILE", "data/registry.csv"),
            model_file: env_path("CLASSIFIER_MODEL_FILE", "data/classifier.json"),
            cache_dir: env_path("EMBEDDING_CACHE_DIR", "data/embedding_cache"),
            output_dir: env_path("CROSSWALK_OUTPUT_DIR", "data/crosswalks"),
            embedding,
            matching,
        };

        info!(
            "Config: sources={}, registry={}, model={}, cache={}, output={}, embedding_model={}, batch_size={}",
            config.source_dir.display(),
            config.registry_file.display(),
            config.model_file.display(),
            config.cache_dir.display(),
            config.output_dir.display(),
            config.embedding.model,
            config.embedding.batch_size
        );
        config
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE_NAME)
    }

    pub fn crosswalk_path(&self, region: &str) -> PathBuf {
        self.output_dir.join(format!("{}_crosswalk.csv", region))
    }

    pub fn source_path(&self, region: &str) -> PathBuf {
        self.source_dir.join(format!("{}.csv", region))
    }
}

/// Loads a `.env` file if one exists. Variables already set win.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment variables from {}", path.display()),
        Err(_) => info!("No .env file found, using environment variables from system"),
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_or(key, default.to_string()))
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "Ignoring unparseable value '{}' for {}; using default {}",
                    raw, key, default
                );
                default
            }
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let matching = MatchingConfig::default();
        assert_eq!(matching.similarity_threshold, SIMILARITY_THRESHOLD);
        assert_eq!(matching.prediction_threshold, PREDICTION_THRESHOLD);

        let embedding = EmbeddingConfig::default();
        assert_eq!(embedding.batch_size, EMBEDDING_BATCH_SIZE);
        assert_eq!(embedding.max_attempts, 3);
        assert_eq!(embedding.backoff_base, Duration::from_secs(5));
        assert!(embedding.api_key.is_none());
    }

    #[test]
    fn test_output_paths() {
        let config = PipelineConfig {
            source_dir: PathBuf::from("in"),
            registry_file: PathBuf::from("registry.csv"),
            model_file: PathBuf::from("model.json"),
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("out"),
            embedding: EmbeddingConfig::default(),
            matching: MatchingConfig::default(),
        };
        assert_eq!(
            config.crosswalk_path("columbus_oh"),
            PathBuf::from("out/columbus_oh_crosswalk.csv")
        );
        assert_eq!(config.summary_path(), PathBuf::from("out/processing_summary.csv"));
        assert_eq!(config.source_path("columbus_oh"), PathBuf::from("in/columbus_oh.csv"));
    }
}
