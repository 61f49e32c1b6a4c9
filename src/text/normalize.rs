//! Lexical normalization of symptom descriptions.
//!
//! Pipeline:
//! 1. Lowercase
//! 2. Replace every non-word, non-space character with a single space
//! 3. Spell-correct each whitespace-separated word (optional)
//! 4. Lemmatize each corrected word (optional)
//! 5. Opportunistically extract color, size and damage-type attributes
//!
//! Knowledge-base phrases go through the same steps minus spelling correction
//! (see [`Normalizer::phrase`]) so both sides compare in the same token space.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use super::lemma::Lemmatizer;
use super::spelling::SpellCorrector;
use super::stopwords::is_stopword;
use crate::{Error, Result};

/// Color words recognised in descriptions. Last match wins.
const COLORS: &[&str] = &[
    "black", "brown", "gray", "green", "grey", "orange", "pink", "purple", "red", "silver",
    "white", "yellow",
];

/// Size words recognised in descriptions. First match wins.
const SIZES: &[&str] = &["big", "large", "medium", "microscopic", "minute", "small", "tiny"];

/// Damage words recognised in descriptions. First match wins.
const DAMAGE_TYPES: &[&str] = &[
    "bronzing",
    "chewed",
    "curled",
    "curling",
    "defoliation",
    "discoloration",
    "frass",
    "galls",
    "holes",
    "honeydew",
    "mold",
    "punctured",
    "rotting",
    "spots",
    "sticky",
    "stippled",
    "stippling",
    "stunted",
    "tunneling",
    "webbing",
    "wilting",
    "yellowing",
];

/// A description reduced to canonical tokens, built fresh per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedQuery {
    /// Description as received
    pub original: String,
    /// Lowercased, punctuation-free, spell-corrected words
    pub words: Vec<String>,
    /// Lemmatized tokens, one per word
    pub tokens: Vec<String>,
    /// Tokens joined by single spaces
    pub text: String,
    /// Last color word seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// First size word seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// First damage word seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
}

impl NormalizedQuery {
    /// Corrected description (words joined by spaces)
    #[must_use]
    pub fn corrected(&self) -> String {
        self.words.join(" ")
    }

    /// `(word, token)` pairs, skipping stopwords
    pub fn content_terms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.words
            .iter()
            .zip(&self.tokens)
            .filter(|(w, _)| !is_stopword(w))
            .map(|(w, t)| (w.as_str(), t.as_str()))
    }

    /// Whether `phrase` occurs in the query on token boundaries
    #[must_use]
    pub fn contains_phrase(&self, phrase: &Phrase) -> bool {
        !phrase.text.is_empty() && format!(" {} ", self.text).contains(&format!(" {} ", phrase.text))
    }
}

/// A knowledge-base string in the normalizer's token space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    /// Source string as authored
    pub source: String,
    /// Lemmatized tokens joined by single spaces
    pub text: String,
    /// Non-stopword `(word, token)` pairs
    pub terms: Vec<(String, String)>,
}

/// Turns free text into canonical tokens.
pub struct Normalizer {
    corrector: Option<Arc<dyn SpellCorrector>>,
    lemmatizer: Option<Arc<dyn Lemmatizer>>,
    max_length: usize,
}

impl Normalizer {
    /// Create a normalizer; either collaborator may be absent.
    #[must_use]
    pub fn new(
        corrector: Option<Arc<dyn SpellCorrector>>,
        lemmatizer: Option<Arc<dyn Lemmatizer>>,
        max_length: usize,
    ) -> Self {
        Self {
            corrector,
            lemmatizer,
            max_length,
        }
    }

    /// Normalize a description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the description is blank or longer
    /// than the configured maximum.
    pub fn normalize(&self, text: &str) -> Result<NormalizedQuery> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("Description cannot be empty."));
        }
        let length = text.chars().count();
        if length > self.max_length {
            return Err(Error::invalid_input(format!(
                "Description exceeds maximum length of {} characters.",
                self.max_length
            )));
        }

        let words: Vec<String> = strip_punctuation(text)
            .split_whitespace()
            .map(|w| match &self.corrector {
                Some(corrector) => corrector.correct(w),
                None => w.to_string(),
            })
            .collect();

        if words.is_empty() {
            return Err(Error::invalid_input(
                "Description must contain at least one word.",
            ));
        }

        let tokens: Vec<String> = words.iter().map(|w| self.lemma(w)).collect();
        let (color, size, damage_type) = extract_attributes(&words);

        Ok(NormalizedQuery {
            original: text.to_string(),
            text: tokens.join(" "),
            words,
            tokens,
            color,
            size,
            damage_type,
        })
    }

    /// Normalize a knowledge-base string (no spelling correction).
    #[must_use]
    pub fn phrase(&self, source: &str) -> Phrase {
        let mut tokens = Vec::new();
        let mut terms = Vec::new();
        for word in strip_punctuation(source).split_whitespace() {
            let token = self.lemma(word);
            if !is_stopword(word) {
                terms.push((word.to_string(), token.clone()));
            }
            tokens.push(token);
        }
        Phrase {
            source: source.to_string(),
            text: tokens.join(" "),
            terms,
        }
    }

    /// Base form of a single lowercase word
    #[must_use]
    pub fn lemma(&self, word: &str) -> String {
        match &self.lemmatizer {
            Some(lemmatizer) => lemmatizer.lemma(word),
            None => word.to_string(),
        }
    }
}

/// Lowercase and replace punctuation with spaces so `leaves,sticky` does
/// not fuse into one token.
fn strip_punctuation(text: &str) -> String {
    static NON_WORD_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"[^\w\s]+").unwrap()
    });
    re.replace_all(&text.to_lowercase(), " ").into_owned()
}

fn extract_attributes(words: &[String]) -> (Option<String>, Option<String>, Option<String>) {
    let mut color = None;
    let mut size = None;
    let mut damage_type = None;
    for word in words {
        let w = word.as_str();
        if COLORS.contains(&w) {
            color = Some(word.clone());
        }
        if size.is_none() && SIZES.contains(&w) {
            size = Some(word.clone());
        }
        if damage_type.is_none() && DAMAGE_TYPES.contains(&w) {
            damage_type = Some(word.clone());
        }
    }
    (color, size, damage_type)
}
