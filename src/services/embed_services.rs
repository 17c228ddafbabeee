// src/services/embed_services.rs

use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::config::EmbeddingConfig;
use crate::errors::{MatchError, MatchResult};
use crate::services::retry::{retry_with_backoff, RetryPolicy, Sleeper};

/// Anything that turns a batch of names into embedding vectors, one per name, in order.
pub trait EmbeddingProvider {
    fn embed_batch(&self, texts: &[String]) -> MatchResult<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAIEmbedder {
    pub fn new(
        api_key: String,
        model: String,
        api_url: String,
        timeout: Duration,
    ) -> MatchResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            MatchError::TransientService(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            client,
            api_key,
            model,
            api_url,
        })
    }

    /// Fails when no API key is configured; callers treat that as a startup error.
    pub fn from_config(config: &EmbeddingConfig) -> MatchResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            MatchError::InvalidInput("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(
            api_key,
            config.model.clone(),
            config.api_url.clone(),
            config.request_timeout,
        )
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingProvider for OpenAIEmbedder {
    fn embed_batch(&self, texts: &[String]) -> MatchResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| MatchError::TransientService(e.to_string()))?;

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| MatchError::TransientService(format!("malformed response: {}", e)))?;

        // The service may return items out of order
        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Batching front-end for a provider: fixed batch size, retries, and a pause between batches.
pub struct EmbeddingService<'a> {
    provider: &'a dyn EmbeddingProvider,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    batch_size: usize,
    batch_pause: Duration,
}

impl<'a> EmbeddingService<'a> {
    pub fn new(
        provider: &'a dyn EmbeddingProvider,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
        batch_size: usize,
        batch_pause: Duration,
    ) -> Self {
        Self {
            provider,
            sleeper,
            policy,
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    pub fn from_config(
        provider: &'a dyn EmbeddingProvider,
        sleeper: &'a dyn Sleeper,
        config: &EmbeddingConfig,
    ) -> Self {
        Self::new(
            provider,
            sleeper,
            RetryPolicy::new(config.max_attempts, config.backoff_base),
            config.batch_size,
            config.batch_pause,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embeds one batch, retrying per the policy. `batch_number` is only used for reporting.
    ///
    /// A response with the wrong number of vectors counts as a failed attempt.
    pub fn embed_batch(&self, batch_number: usize, names: &[String]) -> MatchResult<Vec<Vec<f32>>> {
        let start = Instant::now();
        let vectors = retry_with_backoff(&self.policy, self.sleeper, batch_number, |attempt| {
            debug!(
                "Batch {}: requesting {} embeddings from {} (attempt {})",
                batch_number,
                names.len(),
                self.provider.model_name(),
                attempt
            );
            let vectors = self.provider.embed_batch(names)?;
            if vectors.len() != names.len() {
                return Err(MatchError::TransientService(format!(
                    "expected {} embeddings, received {}",
                    names.len(),
                    vectors.len()
                )));
            }
            Ok(vectors)
        })?;

        info!(
            "Batch {}: embedded {} names in {:.2?}",
            batch_number,
            names.len(),
            start.elapsed()
        );
        // Stay under the service rate limit
        self.sleeper.sleep(self.batch_pause);
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retry::RecordingSleeper;
    use std::cell::Cell;

    struct ShortProvider {
        calls: Cell<usize>,
    }

    impl EmbeddingProvider for ShortProvider {
        fn embed_batch(&self, texts: &[String]) -> MatchResult<Vec<Vec<f32>>> {
            self.calls.set(self.calls.get() + 1);
            // drops one vector on the first call
            let n = if self.calls.get() == 1 { texts.len() - 1 } else { texts.len() };
            Ok(vec![vec![1.0, 0.0]; n])
        }

        fn model_name(&self) -> &str {
            "short"
        }
    }

    #[test]
    fn test_wrong_vector_count_is_retried() {
        let provider = ShortProvider { calls: Cell::new(0) };
        let sleeper = RecordingSleeper::new();
        let service = EmbeddingService::new(
            &provider,
            &sleeper,
            RetryPolicy::new(3, Duration::from_secs(5)),
            10,
            Duration::from_millis(100),
        );

        let names = vec!["a".to_string(), "b".to_string()];
        let vectors = service.embed_batch(1, &names).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(provider.calls.get(), 2);
        // one backoff sleep, then the inter-batch pause
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(5), Duration::from_millis(100)]
        );
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let config = EmbeddingConfig::default();
        assert!(OpenAIEmbedder::from_config(&config).is_err());
    }
}
