// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use poi_linker_lib::config::{EmbeddingConfig, MatchingConfig, PipelineConfig};
use poi_linker_lib::matching::normalize;
use poi_linker_lib::services::embed_services::EmbeddingProvider;
use poi_linker_lib::{MatchError, MatchResult};

/// Deterministic embedder: letter histogram of the normalized name plus a constant bias term.
/// Names that normalize identically get identical vectors.
pub struct FakeEmbedder {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on: HashSet<String>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: HashSet::new(),
        }
    }

    /// Any batch containing one of these names fails with a service error.
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn embedded_names(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }

    pub fn vector_for(name: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 27];
        for c in normalize(name).chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        v[26] = 0.5;
        v
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn embed_batch(&self, texts: &[String]) -> MatchResult<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        if let Some(bad) = texts.iter().find(|t| self.fail_on.contains(t.as_str())) {
            return Err(MatchError::TransientService(format!("503 for '{}'", bad)));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "fake-letters"
    }
}

pub fn test_embedding_config(batch_size: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        api_key: None,
        batch_size,
        max_attempts: 2,
        backoff_base: Duration::from_secs(5),
        batch_pause: Duration::from_millis(100),
        ..EmbeddingConfig::default()
    }
}

pub fn test_pipeline_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        source_dir: root.join("sources"),
        registry_file: root.join("registry.csv"),
        model_file: root.join("classifier.json"),
        cache_dir: root.join("cache"),
        output_dir: root.join("out"),
        embedding: test_embedding_config(100),
        matching: MatchingConfig::default(),
    }
}

pub fn write_sources(config: &PipelineConfig, region: &str, names: &[&str]) {
    std::fs::create_dir_all(&config.source_dir).unwrap();
    let mut writer = csv::Writer::from_path(config.source_path(region)).unwrap();
    writer.write_record(["location_name", "city"]).unwrap();
    for name in names {
        writer.write_record([*name, "somewhere"]).unwrap();
    }
    writer.flush().unwrap();
}

pub fn write_registry(config: &PipelineConfig, rows: &[(&str, &str)]) {
    let mut writer = csv::Writer::from_path(&config.registry_file).unwrap();
    writer.write_record(["region", "company_name"]).unwrap();
    for (region, name) in rows {
        writer.write_record([*region, *name]).unwrap();
    }
    writer.flush().unwrap();
}

/// Model driven almost entirely by normalized Jaro-Winkler: identical normalized names
/// score ~0.95, unrelated names fall well below the 0.4 cutoff.
pub fn write_classifier(config: &PipelineConfig) {
    std::fs::write(
        &config.model_file,
        r#"{"features":["cos_sim","jaro_winkler_norm"],"coefficients":[2.0,10.0],"intercept":-9.0,"version":"test"}"#,
    )
    .unwrap();
}
