//! Similarity backends.
//!
//! The backend is picked once at startup:
//! - `Semantic`: embedding cosine over a precomputed, text-keyed cache, with
//!   fuzzy matching still applied alongside
//! - `Fuzzy`: edit-distance ratios only, used when no embedder is configured or
//!   the embedder failed during startup

pub mod embedding;
pub mod fuzzy;

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::{StreamExt, stream};
use tracing::{debug, info};

pub use embedding::{Embedder, HashingEmbedder, HttpEmbedder, cosine};
pub use fuzzy::FUZZY_THRESHOLD;

use crate::text::NormalizedQuery;
use crate::{Error, Result};

/// Cosine similarity a pair must strictly exceed to count as a match.
pub const COSINE_THRESHOLD: f64 = 0.4;

/// Batches encoded in parallel while warming the cache
const WARM_CONCURRENCY: usize = 4;

/// Matching strategy, fixed for the process lifetime.
pub enum SimilarityBackend {
    /// Embedding cosine plus fuzzy ratios
    Semantic(SemanticIndex),
    /// Fuzzy ratios only
    Fuzzy,
}

impl SimilarityBackend {
    /// Mode label reported by health checks
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Semantic(_) => "semantic",
            Self::Fuzzy => "fuzzy",
        }
    }

    /// The semantic index, when running in semantic mode
    #[must_use]
    pub fn semantic(&self) -> Option<&SemanticIndex> {
        match self {
            Self::Semantic(index) => Some(index),
            Self::Fuzzy => None,
        }
    }
}

/// Cache key for a text: trimmed and lowercased.
fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Embedder plus a cache of vectors keyed by the exact (lowercased) text.
///
/// Keys are texts, not profile names, so an edited symptom can never be
/// served a vector computed for its previous wording.
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    cache: DashMap<String, Arc<[f32]>>,
    dimension: OnceLock<usize>,
    batch_size: usize,
}

impl SemanticIndex {
    /// Create an empty index
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            cache: DashMap::new(),
            dimension: OnceLock::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Embedder label
    #[must_use]
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Number of cached vectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cached vector for `text`
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Arc<[f32]>> {
        self.cache.get(&cache_key(text)).map(|v| Arc::clone(v.value()))
    }

    /// Encode every text not cached yet, in batches. Returns how many were
    /// newly encoded.
    ///
    /// # Errors
    ///
    /// Fails if the embedder fails or returns empty or inconsistently sized
    /// vectors. Vectors from batches that succeeded stay cached.
    pub async fn warm<I, S>(&self, texts: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let missing: Vec<String> = texts
            .into_iter()
            .map(|t| cache_key(t.as_ref()))
            .filter(|k| !k.is_empty() && !self.cache.contains_key(k) && seen.insert(k.clone()))
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let owned: Vec<Vec<String>> = missing
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let mut batches = stream::iter(owned)
            .map(|batch| async move {
                let vectors = self.encode_checked(&batch).await?;
                Ok::<_, Error>((batch, vectors))
            })
            .buffer_unordered(WARM_CONCURRENCY);
        while let Some(encoded) = batches.next().await {
            let (batch, vectors) = encoded?;
            for (text, vector) in batch.into_iter().zip(vectors) {
                self.cache.insert(text, Arc::from(vector));
            }
        }

        info!(
            embedder = self.embedder.name(),
            encoded = missing.len(),
            cached = self.cache.len(),
            "Embedding cache warmed"
        );
        Ok(missing.len())
    }

    /// Drop cached vectors whose text is not in `live`. Returns how many
    /// were evicted.
    pub fn retain_texts<I, S>(&self, live: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let live: HashSet<String> = live.into_iter().map(|t| cache_key(t.as_ref())).collect();
        let before = self.cache.len();
        self.cache.retain(|key, _| live.contains(key));
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!(evicted, cached = self.cache.len(), "Evicted stale embeddings");
        }
        evicted
    }

    /// Encode a query's corrected text and its distinct content words.
    ///
    /// # Errors
    ///
    /// Fails if the embedder fails or returns malformed vectors.
    pub async fn encode_query(&self, query: &NormalizedQuery) -> Result<QueryEmbedding> {
        let mut seen = HashSet::new();
        let words: Vec<String> = query
            .content_terms()
            .map(|(w, _)| w.to_string())
            .filter(|w| seen.insert(w.clone()))
            .collect();

        let mut inputs = Vec::with_capacity(words.len() + 1);
        inputs.push(query.corrected());
        inputs.extend(words.iter().cloned());

        let mut vectors = self.encode_checked(&inputs).await?.into_iter();
        let text = vectors
            .next()
            .ok_or_else(|| Error::Embedding("no vector for query text".to_string()))?;
        let tokens = words.into_iter().zip(vectors).collect();
        debug!(dimension = text.len(), "Query encoded");
        Ok(QueryEmbedding { text, tokens })
    }

    async fn encode_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.encode_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for vector in &vectors {
            if vector.is_empty() {
                return Err(Error::Embedding("empty vector".to_string()));
            }
            let expected = *self.dimension.get_or_init(|| vector.len());
            if vector.len() != expected {
                return Err(Error::Embedding(format!(
                    "inconsistent dimension: expected {expected}, got {}",
                    vector.len()
                )));
            }
        }
        Ok(vectors)
    }
}

/// Vectors for one request's query.
#[derive(Debug, Clone)]
pub struct QueryEmbedding {
    /// Vector of the whole corrected description
    pub text: Vec<f32>,
    /// Vectors of each distinct content word
    pub tokens: Vec<(String, Vec<f32>)>,
}

/// A query embedding paired with the index it is compared against.
#[derive(Clone, Copy)]
pub struct SemanticView<'a> {
    index: &'a SemanticIndex,
    query: &'a QueryEmbedding,
}

impl<'a> SemanticView<'a> {
    /// Pair a query with an index
    #[must_use]
    pub fn new(index: &'a SemanticIndex, query: &'a QueryEmbedding) -> Self {
        Self { index, query }
    }

    /// Cosine between the whole query and `text`; `None` when `text` was
    /// never encoded.
    ///
    /// # Errors
    ///
    /// Fails on a dimension mismatch.
    pub fn text_cosine(&self, text: &str) -> Result<Option<f64>> {
        match self.index.get(text) {
            Some(vector) => cosine(&self.query.text, &vector).map(Some),
            None => Ok(None),
        }
    }

    /// Best cosine between any query word and `text`; `None` when `text` was
    /// never encoded or the query has no content words.
    ///
    /// # Errors
    ///
    /// Fails on a dimension mismatch.
    pub fn best_token_cosine(&self, text: &str) -> Result<Option<f64>> {
        let Some(vector) = self.index.get(text) else {
            return Ok(None);
        };
        let mut best: Option<f64> = None;
        for (_, token_vector) in &self.query.tokens {
            let sim = cosine(token_vector, &vector)?;
            best = Some(best.map_or(sim, |b| b.max(sim)));
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::text::Normalizer;

    struct FixedEmbedder {
        dims: Vec<usize>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, _)| vec![1.0; self.dims[i % self.dims.len()]])
                .collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn hashing_index() -> SemanticIndex {
        SemanticIndex::new(Arc::new(HashingEmbedder::new(256)), 2)
    }

    #[tokio::test]
    async fn warm_encodes_each_text_once() {
        // GIVEN: duplicates differing only in case and padding
        let index = hashing_index();

        // WHEN: warming twice
        let first = index.warm(["Sticky leaves", "sticky leaves ", "aphid", "mold"]).await.unwrap();
        let second = index.warm(["aphid", "whitefly"]).await.unwrap();

        // THEN: only new texts are encoded
        assert_eq!(first, 3);
        assert_eq!(second, 1);
        assert_eq!(index.len(), 4);
        assert!(index.get("STICKY LEAVES").is_some());
    }

    #[tokio::test]
    async fn retain_evicts_texts_no_longer_referenced() {
        // GIVEN: a cache holding an outdated symptom
        let index = hashing_index();
        index.warm(["silver streaks", "black specks", "aphid"]).await.unwrap();

        // WHEN: only two texts are still live
        let evicted = index.retain_texts(["Black specks", "aphid"]);

        // THEN: the stale one is gone and the live ones stay cached
        assert_eq!(evicted, 1);
        assert_eq!(index.len(), 2);
        assert!(index.get("silver streaks").is_none());
        assert!(index.get("black specks").is_some());
    }

    #[tokio::test]
    async fn inconsistent_dimensions_are_rejected() {
        let index = SemanticIndex::new(Arc::new(FixedEmbedder { dims: vec![4, 5] }), 8);
        let err = index.warm(["a", "b"]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn empty_vectors_are_rejected() {
        let index = SemanticIndex::new(Arc::new(FixedEmbedder { dims: vec![0] }), 8);
        assert!(index.warm(["a"]).await.is_err());
    }

    #[tokio::test]
    async fn view_compares_query_against_cached_texts() {
        let index = hashing_index();
        index.warm(["tiny white insects", "flat tire"]).await.unwrap();
        let normalizer = Normalizer::new(None, None, 200);
        let query = normalizer.normalize("tiny white insects on my tomato").unwrap();
        let encoded = index.encode_query(&query).await.unwrap();
        let view = SemanticView::new(&index, &encoded);

        let close = view.text_cosine("tiny white insects").unwrap().unwrap();
        assert!(close > COSINE_THRESHOLD);
        assert!(view.text_cosine("never encoded").unwrap().is_none());

        // Content words exclude stopwords ("on", "my")
        assert_eq!(encoded.tokens.len(), 4);
        let token = view.best_token_cosine("tiny white insects").unwrap().unwrap();
        assert!(token > 0.0);
    }

    #[test]
    fn backend_reports_mode() {
        assert_eq!(SimilarityBackend::Fuzzy.mode(), "fuzzy");
        assert!(SimilarityBackend::Fuzzy.semantic().is_none());
        assert_eq!(SimilarityBackend::Semantic(hashing_index()).mode(), "semantic");
    }
}
