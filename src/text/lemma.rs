//! Base-form reduction for tokens.

use rust_stemmers::{Algorithm, Stemmer};

/// Reduces a token to its base form (`leaves` and `leaf` compare equal,
/// `bugs` becomes `bug`). Optional: without one, tokens are compared as-is.
pub trait Lemmatizer: Send + Sync {
    /// Base form of `token` (already lowercase)
    fn lemma(&self, token: &str) -> String;
}

/// Snowball English stemmer.
///
/// Both query text and knowledge-base phrases go through the same reduction,
/// so only consistency matters, not dictionary-correct lemmas.
pub struct SnowballLemmatizer {
    stemmer: Stemmer,
}

impl SnowballLemmatizer {
    /// Create an English stemmer
    #[must_use]
    pub fn english() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }
}

impl Default for SnowballLemmatizer {
    fn default() -> Self {
        Self::english()
    }
}

impl Lemmatizer for SnowballLemmatizer {
    fn lemma(&self, token: &str) -> String {
        if token.chars().any(|c| c.is_ascii_digit()) {
            return token.to_string();
        }
        self.stemmer.stem(token).into_owned()
    }
}
