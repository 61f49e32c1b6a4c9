//! The identification engine.
//!
//! [`PestEngine`] owns every long-lived collaborator (knowledge base,
//! normalizer, synonym expander, similarity backend, relatedness gate,
//! annotator) and is shared behind an `Arc`. Each [`PestEngine::analyze`]
//! call is independent: it normalizes the description, gates it, scores
//! every profile and ranks the results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agropest_core::PestProfile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::annotate::{Annotator, GeminiAnnotator, explain_or_fallback};
use crate::config::{Config, ConfidenceScale, EmbeddingProvider, ReportsConfig};
use crate::gate::{RelatednessGate, Vocabulary};
use crate::guidance::{GuidanceKind, guidance};
use crate::kb::{JsonFileStore, KnowledgeBase, KnowledgeStore, Snapshot};
use crate::report;
use crate::scorer::{MatchResult, Scorer, rank};
use crate::similarity::{
    Embedder, HashingEmbedder, HttpEmbedder, SemanticIndex, SemanticView, SimilarityBackend,
};
use crate::synonyms::{FileThesaurus, LayeredThesaurus, StaticThesaurus, SynonymExpander, Thesaurus};
use crate::text::{DOMAIN_KEYWORDS, DictionaryCorrector, Lemmatizer, Normalizer, SnowballLemmatizer, SpellCorrector};
use crate::{Error, Result};

/// Pest name reported when nothing was identified.
pub const UNKNOWN_PEST: &str = "Unknown";

/// Outcome of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// At least one candidate survived ranking
    Identified,
    /// Pest-related, but nothing scored
    NoMatch,
    /// Rejected by the relatedness gate
    OffTopic,
}

/// Result of analyzing one description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Correlates logs for this request
    pub request_id: String,
    /// Outcome
    pub verdict: Verdict,
    /// Top candidate, or [`UNKNOWN_PEST`]
    pub pest: String,
    /// Top candidate's confidence, 0 when unknown
    pub confidence: f64,
    /// Ranked candidates (at most three)
    pub candidates: Vec<MatchResult>,
    /// Hints for the user
    pub guidance: Vec<String>,
    /// Description after punctuation stripping and spelling correction
    pub corrected: String,
}

impl Analysis {
    /// Whether a pest was identified
    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.verdict == Verdict::Identified
    }
}

/// A rendered report and where it was written, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReport {
    /// Report text
    pub text: String,
    /// File the report was saved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Analysis plus side-channel outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    /// Ranking outcome
    #[serde(flatten)]
    pub analysis: Analysis,
    /// Generative explanation, when annotation is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Text report, for identified pests when reports are enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<GeneratedReport>,
}

/// Builds a [`PestEngine`], with optional overrides for collaborators that
/// would otherwise come from configuration.
pub struct EngineBuilder {
    config: Config,
    store: Option<Arc<dyn KnowledgeStore>>,
    embedder: Option<Option<Arc<dyn Embedder>>>,
    annotator: Option<Option<Arc<dyn Annotator>>>,
}

impl EngineBuilder {
    /// Start from configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            embedder: None,
            annotator: None,
        }
    }

    /// Use `store` instead of the configured JSON file
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `embedder` (or none, for fuzzy-only mode) instead of the configured provider
    #[must_use]
    pub fn embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use `annotator` (or none) instead of the configured one
    #[must_use]
    pub fn annotator(mut self, annotator: Option<Arc<dyn Annotator>>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Load the knowledge base, build collaborators and precompute embeddings.
    ///
    /// An embedder that fails during precompute downgrades the engine to
    /// fuzzy-only mode rather than failing the build.
    ///
    /// # Errors
    ///
    /// Fails if the knowledge base cannot be loaded or a configured
    /// collaborator cannot be constructed.
    pub async fn build(self) -> Result<PestEngine> {
        let config = self.config;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(
                &config.knowledge_base.path,
                config.knowledge_base.seed_defaults,
            )),
        };
        let kb = KnowledgeBase::load(store)?;
        let snapshot = kb.snapshot();

        let expander = SynonymExpander::new(build_thesaurus(&config)?);

        let corrector = config.engine.spell_correct.then(|| {
            let corrector = DictionaryCorrector::new(DOMAIN_KEYWORDS.iter().copied());
            for (name, profile) in &snapshot.profiles {
                corrector.add_words(dictionary_texts(name, profile));
            }
            Arc::new(corrector)
        });
        let lemmatizer: Option<Arc<dyn Lemmatizer>> = config
            .engine
            .lemmatize
            .then(|| Arc::new(SnowballLemmatizer::english()) as Arc<dyn Lemmatizer>);
        let normalizer = Normalizer::new(
            corrector.clone().map(|c| c as Arc<dyn SpellCorrector>),
            lemmatizer,
            config.engine.max_description_length,
        );

        let gate = RelatednessGate::new();
        let vocabulary = gate.vocabulary(&snapshot, &normalizer, &expander);

        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => configured_embedder(&config)?,
        };
        let backend = match embedder {
            Some(embedder) => {
                let index = SemanticIndex::new(embedder, config.embedding.batch_size);
                match index.warm(live_texts(&snapshot, &vocabulary)).await {
                    Ok(_) => SimilarityBackend::Semantic(index),
                    Err(e) => {
                        warn!(
                            embedder = index.embedder_name(),
                            error = %e,
                            "Embedding backend unavailable, using fuzzy matching only"
                        );
                        SimilarityBackend::Fuzzy
                    }
                }
            }
            None => SimilarityBackend::Fuzzy,
        };

        let annotator = match self.annotator {
            Some(annotator) => annotator,
            None if config.annotation.enabled => {
                Some(Arc::new(GeminiAnnotator::new(&config.annotation)?) as Arc<dyn Annotator>)
            }
            None => None,
        };

        info!(
            profiles = snapshot.profiles.len(),
            mode = backend.mode(),
            synonyms = expander.is_enabled(),
            spell_correct = corrector.is_some(),
            annotation = annotator.is_some(),
            "Pest engine ready"
        );

        Ok(PestEngine {
            kb,
            normalizer,
            corrector,
            expander,
            backend,
            gate,
            annotator,
            annotation_timeout: config.annotation.timeout,
            confidence: config.engine.confidence,
            reports: config.reports,
            refresh: tokio::sync::Mutex::new(()),
        })
    }
}

/// Every text the semantic cache should hold for one revision: each
/// profile's compared fields plus the relatedness vocabulary.
fn live_texts(snapshot: &Snapshot, vocabulary: &Vocabulary) -> Vec<String> {
    snapshot
        .profiles
        .iter()
        .flat_map(|(name, profile)| profile.match_texts(name))
        .chain(vocabulary.texts().map(str::to_string))
        .collect()
}

fn build_thesaurus(config: &Config) -> Result<Option<Arc<dyn Thesaurus>>> {
    if !config.thesaurus.enabled {
        return Ok(None);
    }
    let thesaurus: Arc<dyn Thesaurus> = match &config.thesaurus.path {
        Some(path) => {
            let file = FileThesaurus::load(path)?;
            info!(path = %path.display(), terms = file.len(), "Loaded thesaurus");
            Arc::new(LayeredThesaurus::new(vec![Arc::new(StaticThesaurus), Arc::new(file)]))
        }
        None => Arc::new(StaticThesaurus),
    };
    Ok(Some(thesaurus))
}

fn configured_embedder(config: &Config) -> Result<Option<Arc<dyn Embedder>>> {
    Ok(match config.embedding.provider {
        EmbeddingProvider::None => None,
        EmbeddingProvider::Hashing => {
            Some(Arc::new(HashingEmbedder::new(config.embedding.dimension)) as Arc<dyn Embedder>)
        }
        EmbeddingProvider::Http => Some(Arc::new(HttpEmbedder::new(&config.embedding)?) as Arc<dyn Embedder>),
    })
}

/// Words a profile contributes to the spelling dictionary.
fn dictionary_texts<'a>(name: &'a str, profile: &'a PestProfile) -> impl Iterator<Item = &'a str> {
    std::iter::once(name)
        .chain(profile.symptoms.iter().map(String::as_str))
        .chain(profile.crops.iter().map(String::as_str))
        .chain(profile.synonyms.iter().map(String::as_str))
        .chain(profile.appearance.color.iter().map(String::as_str))
        .chain(profile.appearance.size.iter().map(String::as_str))
}

/// Shared identification engine.
pub struct PestEngine {
    kb: KnowledgeBase,
    normalizer: Normalizer,
    corrector: Option<Arc<DictionaryCorrector>>,
    expander: SynonymExpander,
    backend: SimilarityBackend,
    gate: RelatednessGate,
    annotator: Option<Arc<dyn Annotator>>,
    annotation_timeout: Duration,
    confidence: ConfidenceScale,
    reports: ReportsConfig,
    /// Serializes post-update refreshes so eviction never races a newer revision
    refresh: tokio::sync::Mutex<()>,
}

impl PestEngine {
    /// Build an engine from configuration alone
    ///
    /// # Errors
    ///
    /// See [`EngineBuilder::build`].
    pub async fn build(config: Config) -> Result<Self> {
        EngineBuilder::new(config).build().await
    }

    /// Similarity mode label (`semantic` or `fuzzy`)
    #[must_use]
    pub fn mode(&self) -> &'static str {
        self.backend.mode()
    }

    /// Knowledge base accessor
    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Case-insensitive exact profile lookup
    #[must_use]
    pub fn search(&self, name: &str) -> Option<PestProfile> {
        self.kb.search(name)
    }

    /// Rank candidate pests for a description.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidInput`] for blank or overlong descriptions.
    /// Off-topic and unmatched descriptions are outcomes, not errors.
    pub async fn analyze(&self, description: &str) -> Result<Analysis> {
        let request_id = Uuid::new_v4().to_string();
        self.analyze_request(description, request_id).await
    }

    #[tracing::instrument(skip_all, fields(request_id = %request_id))]
    async fn analyze_request(&self, description: &str, request_id: String) -> Result<Analysis> {
        let query = self.normalizer.normalize(description)?;
        debug!(corrected = %query.corrected(), tokens = ?query.tokens, "Description normalized");

        let snapshot: Arc<Snapshot> = self.kb.snapshot();
        let vocabulary = self.gate.vocabulary(&snapshot, &self.normalizer, &self.expander);

        let index = self.backend.semantic();
        let encoded = match index {
            Some(index) => match index.encode_query(&query).await {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    warn!(error = %e, "Query encoding failed, matching without embeddings");
                    None
                }
            },
            None => None,
        };
        let view = index
            .zip(encoded.as_ref())
            .map(|(index, encoded)| SemanticView::new(index, encoded));

        if !self.gate.is_related(&query, &vocabulary, view.as_ref()) {
            info!(verdict = "off_topic", "Description is not pest-related");
            return Ok(Analysis {
                request_id,
                verdict: Verdict::OffTopic,
                pest: UNKNOWN_PEST.to_string(),
                confidence: 0.0,
                candidates: Vec::new(),
                guidance: guidance(GuidanceKind::OffTopic, Some(&query)),
                corrected: query.corrected(),
            });
        }

        let scorer = Scorer::new(&self.normalizer, &self.expander, self.confidence);
        let candidates = rank(scorer.score_all(&query, &snapshot.profiles, view.as_ref()));

        let Some(top) = candidates.first() else {
            info!(verdict = "no_match", "No pest matched");
            return Ok(Analysis {
                request_id,
                verdict: Verdict::NoMatch,
                pest: UNKNOWN_PEST.to_string(),
                confidence: 0.0,
                candidates,
                guidance: guidance(GuidanceKind::NoMatch, Some(&query)),
                corrected: query.corrected(),
            });
        };

        info!(
            verdict = "identified",
            pest = %top.pest,
            score = top.score,
            candidates = candidates.len(),
            "Pest identified"
        );
        Ok(Analysis {
            request_id,
            verdict: Verdict::Identified,
            pest: top.pest.clone(),
            confidence: top.confidence,
            guidance: guidance(GuidanceKind::Refine, Some(&query)),
            corrected: query.corrected(),
            candidates,
        })
    }

    /// Generative explanation for an analysis; `None` when annotation is off.
    pub async fn explain(&self, description: &str, analysis: &Analysis) -> Option<String> {
        self.explain_within(description, analysis, self.annotation_timeout).await
    }

    async fn explain_within(
        &self,
        description: &str,
        analysis: &Analysis,
        budget: Duration,
    ) -> Option<String> {
        let annotator = self.annotator.as_ref()?;
        Some(
            explain_or_fallback(
                annotator.as_ref(),
                budget.min(self.annotation_timeout),
                description,
                &analysis.candidates,
            )
            .await,
        )
    }

    /// Render (and, with a configured directory, save) a report for an
    /// identified pest.
    ///
    /// # Errors
    ///
    /// Fails if the report cannot be written.
    pub fn report(
        &self,
        description: &str,
        analysis: &Analysis,
        explanation: Option<&str>,
    ) -> Result<Option<GeneratedReport>> {
        if !self.reports.enabled || !analysis.is_identified() {
            return Ok(None);
        }
        let profile = self.kb.search(&analysis.pest);
        let text = report::render(
            description,
            &analysis.candidates,
            profile.as_ref(),
            explanation,
            chrono::Utc::now(),
        );
        let path = match &self.reports.directory {
            Some(dir) => Some(report::save(dir, &text)?),
            None => None,
        };
        Ok(Some(GeneratedReport { text, path }))
    }

    /// Analyze, then run the explanation and report side channels.
    ///
    /// # Errors
    ///
    /// Propagates [`PestEngine::analyze`] errors. A report that fails to save
    /// is logged and omitted.
    pub async fn identify(&self, description: &str) -> Result<Identification> {
        let analysis = self.analyze(description).await?;
        Ok(self
            .attach_side_outputs(description, analysis, self.annotation_timeout)
            .await)
    }

    /// [`PestEngine::identify`] under an overall deadline. The deadline
    /// bounds analysis; annotation gets whatever is left and falls back
    /// instead of failing, so a finished ranking is never discarded.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when analysis alone exceeds `deadline`, otherwise
    /// as [`PestEngine::identify`].
    pub async fn identify_within(
        &self,
        description: &str,
        deadline: Duration,
    ) -> Result<Identification> {
        let started = Instant::now();
        let analysis = tokio::time::timeout(deadline, self.analyze(description))
            .await
            .map_err(|_| Error::Timeout(format!("analysis exceeded {}ms", deadline.as_millis())))??;
        let remaining = deadline.saturating_sub(started.elapsed());
        debug!(remaining_ms = remaining.as_millis(), "Analysis finished within deadline");
        Ok(self.attach_side_outputs(description, analysis, remaining).await)
    }

    async fn attach_side_outputs(
        &self,
        description: &str,
        analysis: Analysis,
        annotation_budget: Duration,
    ) -> Identification {
        let explanation = if analysis.verdict == Verdict::OffTopic {
            None
        } else {
            self.explain_within(description, &analysis, annotation_budget).await
        };
        let report = self
            .report(description, &analysis, explanation.as_deref())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Report generation failed");
                None
            });
        Identification {
            analysis,
            explanation,
            report,
        }
    }

    /// Insert or replace a profile, then refresh derived state (spelling
    /// dictionary, relatedness vocabulary, cached embeddings) before
    /// returning.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidProfile`] or store errors from
    /// [`KnowledgeBase::update`].
    pub async fn update_profile(&self, name: &str, profile: PestProfile) -> Result<PestProfile> {
        let _refresh = self.refresh.lock().await;
        let stored = self.kb.update(name, profile).await?;
        let name = agropest_core::canonical_name(name);

        if let Some(corrector) = &self.corrector {
            corrector.add_words(dictionary_texts(&name, &stored));
        }

        let snapshot = self.kb.snapshot();
        let vocabulary = self.gate.vocabulary(&snapshot, &self.normalizer, &self.expander);

        if let Some(index) = self.backend.semantic() {
            let live = live_texts(&snapshot, &vocabulary);
            if let Err(e) = index.warm(&live).await {
                warn!(pest = %name, error = %e, "Re-encoding updated profile failed, fuzzy matching covers it");
            }
            index.retain_texts(&live);
        }
        Ok(stored)
    }
}
