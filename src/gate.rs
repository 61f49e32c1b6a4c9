//! Relatedness gate: rejects descriptions that are not about pests before
//! any scoring happens.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::kb::Snapshot;
use crate::similarity::{COSINE_THRESHOLD, SemanticView, fuzzy};
use crate::synonyms::SynonymExpander;
use crate::text::{DOMAIN_KEYWORDS, NormalizedQuery, Normalizer, Phrase, is_stopword};

/// Query words shorter than this are never fuzzy-matched against the vocabulary.
const MIN_FUZZY_WORD_LEN: usize = 3;

/// Words that make any description pest-related on their own.
const DOMAIN_NOUNS: &[&str] = &[
    "beetle",
    "bug",
    "caterpillar",
    "crop",
    "damage",
    "flower",
    "fly",
    "fruit",
    "infestation",
    "insect",
    "larva",
    "leaf",
    "mite",
    "moth",
    "pest",
    "plant",
    "root",
    "seedling",
    "stem",
    "weevil",
    "worm",
];

/// Terms a description is compared against, built for one knowledge-base
/// revision.
#[derive(Debug)]
pub struct Vocabulary {
    revision: u64,
    phrases: Vec<Phrase>,
    words: BTreeSet<String>,
}

impl Vocabulary {
    /// Build from a snapshot: symptoms, crops and names with their content
    /// words, plus fixed domain terms, all synonym-expanded.
    #[must_use]
    pub fn build(snapshot: &Snapshot, normalizer: &Normalizer, expander: &SynonymExpander) -> Self {
        let mut seeds: BTreeSet<String> = BTreeSet::new();
        for (name, profile) in &snapshot.profiles {
            let sources = std::iter::once(name)
                .chain(profile.symptoms.iter())
                .chain(profile.crops.iter());
            for source in sources {
                let phrase = normalizer.phrase(source);
                seeds.extend(phrase.terms.into_iter().map(|(word, _)| word));
                seeds.insert(source.to_lowercase());
            }
        }
        seeds.extend(DOMAIN_NOUNS.iter().map(|s| (*s).to_string()));
        seeds.extend(DOMAIN_KEYWORDS.iter().map(|s| (*s).to_string()));

        let mut texts: BTreeSet<String> = BTreeSet::new();
        for seed in &seeds {
            texts.extend(expander.synonyms_of(seed));
        }

        let mut phrases = Vec::with_capacity(texts.len());
        let mut words = BTreeSet::new();
        for text in texts {
            let phrase = normalizer.phrase(&text);
            if phrase.text.is_empty() {
                continue;
            }
            words.extend(phrase.terms.iter().map(|(w, _)| w.clone()));
            phrases.push(phrase);
        }

        Self {
            revision: snapshot.revision,
            phrases,
            words,
        }
    }

    /// Knowledge-base revision this vocabulary was built from
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Source texts, for precomputing embeddings
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(|p| p.source.as_str())
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    fn exact_hit(&self, query: &NormalizedQuery) -> Option<&str> {
        self.phrases
            .iter()
            .find(|p| query.contains_phrase(p))
            .map(|p| p.source.as_str())
    }

    fn fuzzy_hit(&self, query: &NormalizedQuery) -> Option<(String, String)> {
        for word in &query.words {
            if word.chars().count() < MIN_FUZZY_WORD_LEN || is_stopword(word) {
                continue;
            }
            if let Some(entry) = self.words.iter().find(|v| fuzzy::is_match(word, v)) {
                return Some((word.clone(), entry.clone()));
            }
        }
        None
    }

    fn semantic_hit(&self, view: &SemanticView<'_>) -> crate::Result<Option<(&str, f64)>> {
        for phrase in &self.phrases {
            if let Some(sim) = view.text_cosine(&phrase.source)? {
                if sim > COSINE_THRESHOLD {
                    return Ok(Some((phrase.source.as_str(), sim)));
                }
            }
        }
        Ok(None)
    }
}

/// Decides whether a description is about pests. Caches its vocabulary per
/// knowledge-base revision.
#[derive(Default)]
pub struct RelatednessGate {
    vocabulary: RwLock<Option<Arc<Vocabulary>>>,
}

impl RelatednessGate {
    /// Create a gate with an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary for `snapshot`, rebuilt when the revision moved.
    pub fn vocabulary(
        &self,
        snapshot: &Snapshot,
        normalizer: &Normalizer,
        expander: &SynonymExpander,
    ) -> Arc<Vocabulary> {
        if let Some(vocab) = self.vocabulary.read().as_ref() {
            if vocab.revision == snapshot.revision {
                return Arc::clone(vocab);
            }
        }
        let vocab = Arc::new(Vocabulary::build(snapshot, normalizer, expander));
        debug!(revision = vocab.revision, entries = vocab.len(), "Relatedness vocabulary built");
        *self.vocabulary.write() = Some(Arc::clone(&vocab));
        vocab
    }

    /// Whether `query` is pest-related.
    ///
    /// Related when a vocabulary entry occurs in the query, a content word
    /// fuzzy-matches a vocabulary word, or (semantic mode) the whole query is
    /// close to an entry. Internal failures fail open.
    #[must_use]
    pub fn is_related(
        &self,
        query: &NormalizedQuery,
        vocabulary: &Vocabulary,
        semantic: Option<&SemanticView<'_>>,
    ) -> bool {
        if let Some(entry) = vocabulary.exact_hit(query) {
            debug!(entry, "Related: exact term");
            return true;
        }
        if let Some((word, entry)) = vocabulary.fuzzy_hit(query) {
            debug!(word = %word, entry = %entry, "Related: fuzzy term");
            return true;
        }
        if let Some(view) = semantic {
            match vocabulary.semantic_hit(view) {
                Ok(Some((entry, similarity))) => {
                    debug!(entry, similarity, "Related: semantic");
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Relatedness check failed, treating description as related");
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::default_knowledge;
    use crate::synonyms::StaticThesaurus;
    use crate::text::SnowballLemmatizer;

    fn setup() -> (Normalizer, SynonymExpander, Snapshot) {
        let normalizer = Normalizer::new(None, Some(Arc::new(SnowballLemmatizer::english())), 500);
        let expander = SynonymExpander::new(Some(Arc::new(StaticThesaurus)));
        let snapshot = Snapshot {
            revision: 0,
            profiles: default_knowledge().unwrap(),
            skipped: Default::default(),
        };
        (normalizer, expander, snapshot)
    }

    fn related(text: &str) -> bool {
        let (normalizer, expander, snapshot) = setup();
        let gate = RelatednessGate::new();
        let vocab = gate.vocabulary(&snapshot, &normalizer, &expander);
        let query = normalizer.normalize(text).unwrap();
        gate.is_related(&query, &vocab, None)
    }

    #[test]
    fn pest_descriptions_are_related() {
        assert!(related("My tomato leaves have tiny white bugs and sticky residue"));
        assert!(related("there are critters on my beans"));
        assert!(related("Whiteflies everywhere"));
    }

    #[test]
    fn misspelled_vocabulary_is_related_via_fuzzy() {
        // GIVEN: no spell corrector, so only the fuzzy channel can help
        // THEN: "cucumbr" still reaches "cucumber"
        assert!(related("the cucumbr is sad"));
    }

    #[test]
    fn car_trouble_is_off_topic() {
        assert!(!related("My car has a flat tire"));
        assert!(!related("what is the weather tomorrow"));
    }

    #[test]
    fn vocabulary_is_cached_per_revision() {
        let (normalizer, expander, mut snapshot) = setup();
        let gate = RelatednessGate::new();
        let first = gate.vocabulary(&snapshot, &normalizer, &expander);
        let again = gate.vocabulary(&snapshot, &normalizer, &expander);
        assert!(Arc::ptr_eq(&first, &again));

        snapshot.revision = 1;
        let rebuilt = gate.vocabulary(&snapshot, &normalizer, &expander);
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.revision(), 1);
    }

    #[test]
    fn vocabulary_includes_synonyms_and_domain_terms() {
        let (normalizer, expander, snapshot) = setup();
        let vocab = Vocabulary::build(&snapshot, &normalizer, &expander);
        let texts: Vec<&str> = vocab.texts().collect();
        assert!(texts.contains(&"foliage"));
        assert!(texts.contains(&"weevil"));
        assert!(texts.contains(&"spider mite"));
    }
}
