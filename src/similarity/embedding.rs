//! Sentence embedders.
//!
//! Two implementations of [`Embedder`]:
//! - [`HttpEmbedder`]: any OpenAI-compatible `/embeddings` endpoint (Ollama,
//!   llama.cpp server, hosted APIs), retried with exponential backoff
//! - [`HashingEmbedder`]: offline feature hashing, no model required

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, RetryConfig, resolve_secret};
use crate::{Error, Result};

/// Encodes text into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode every text, returning one vector per input in the same order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Backend label for logs
    fn name(&self) -> &str;
}

/// Cosine similarity in `[-1, 1]`. Zero vectors have similarity 0.
///
/// # Errors
///
/// Returns [`Error::Embedding`] when the vectors differ in dimension.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::Embedding(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

// ============================================================================
// HTTP embedder
// ============================================================================

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpEmbedder {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: resolve_secret(config.api_key.as_deref()),
            retry: config.retry.clone(),
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.json::<EmbeddingResponse>().await?;
        if body.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut data = body.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if !self.retry.enabled {
            return self.request(texts).await;
        }

        let policy = ExponentialBuilder::default()
            .with_min_delay(self.retry.initial_backoff)
            .with_max_delay(self.retry.max_backoff)
            .with_max_times(self.retry.max_attempts.saturating_sub(1) as usize);

        (|| self.request(texts))
            .retry(policy)
            .when(Error::is_retryable)
            .notify(|e: &Error, delay: Duration| {
                warn!(endpoint = %self.endpoint, error = %e, delay_ms = delay.as_millis(), "Retrying embedding request");
            })
            .await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Hashing embedder
// ============================================================================

/// Offline embedder using signed feature hashing over unigrams and bigrams.
///
/// Texts sharing words land close together; it has no notion of meaning
/// beyond surface overlap, which makes it a deterministic stand-in for a
/// sentence model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create with the given vector dimension (minimum 8)
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Encode a single text synchronously
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            self.add_feature(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        #[allow(clippy::cast_possible_truncation)]
        let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = self.clone();
        let texts = texts.to_vec();
        debug!(count = texts.len(), "Hashing embeddings");
        tokio::task::spawn_blocking(move || texts.iter().map(|t| embedder.encode(t)).collect())
            .await
            .map_err(|e| Error::Internal(format!("embedding task failed: {e}")))
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3f32, -0.2, 0.9];
        assert!((cosine(&v, &v).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        let err = cosine(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert!(cosine(&[0.0, 0.0], &[1.0, 0.0]).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.encode("sticky leaves");
        let b = embedder.encode("Sticky leaves!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_overlap_drives_similarity() {
        // GIVEN: one text sharing words with the reference and one sharing none
        let embedder = HashingEmbedder::new(384);
        let reference = embedder.encode("tiny white insects on tomato leaves");
        let close = embedder.encode("tiny white insects");
        let far = embedder.encode("my car has a flat tire");

        // THEN: overlap scores higher
        let close_sim = cosine(&reference, &close).unwrap();
        let far_sim = cosine(&reference, &far).unwrap();
        assert!(close_sim > 0.4, "close similarity {close_sim}");
        assert!(far_sim < close_sim);
    }

    #[test]
    fn empty_text_encodes_to_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.encode("").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["aphid".to_string(), "whitefly".to_string()];
        let vectors = embedder.encode_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.encode("aphid"));
        assert_eq!(vectors[1], embedder.encode("whitefly"));
    }

    #[tokio::test]
    async fn http_embedder_against_closed_port_fails() {
        // GIVEN: an endpoint nothing listens on and retries disabled
        let config = EmbeddingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            retry: RetryConfig {
                enabled: false,
                ..RetryConfig::default()
            },
            ..EmbeddingConfig::default()
        };
        let embedder = HttpEmbedder::new(&config).unwrap();

        // WHEN/THEN: the call errors instead of hanging
        let result = embedder.encode_batch(&["aphid".to_string()]).await;
        assert!(result.is_err());
    }
}
