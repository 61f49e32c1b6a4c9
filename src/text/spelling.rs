//! Domain-bounded spelling correction.
//!
//! The dictionary is built from the knowledge base (symptom, crop, name and
//! appearance words) plus fixed domain keywords, so corrections only ever pull
//! a token towards vocabulary the matcher can use. Words with no close
//! dictionary entry pass through unchanged.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use strsim::levenshtein;

use super::stopwords::is_stopword;

/// Best-effort per-token correction. Implementations never fail; an
/// uncorrectable token is returned unchanged.
pub trait SpellCorrector: Send + Sync {
    /// Corrected form of `token` (already lowercase)
    fn correct(&self, token: &str) -> String;
}

/// Tokens this short are too ambiguous to correct.
const MIN_CORRECTABLE_LEN: usize = 4;

/// Levenshtein-based corrector over a growable word list.
pub struct DictionaryCorrector {
    words: RwLock<BTreeSet<String>>,
}

impl DictionaryCorrector {
    /// Create a corrector from an initial word list
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let corrector = Self {
            words: RwLock::new(BTreeSet::new()),
        };
        corrector.add_words(words);
        corrector
    }

    /// Add every alphabetic word found in `texts` to the dictionary.
    pub fn add_words<I, S>(&self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words = self.words.write();
        for text in texts {
            for word in split_words(text.as_ref()) {
                words.insert(word);
            }
        }
    }

    /// Number of dictionary words
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    /// Whether the dictionary is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }

    /// Edit budget for a token: 1 for short words, 2 otherwise.
    fn max_distance(len: usize) -> usize {
        if len <= 5 { 1 } else { 2 }
    }
}

impl SpellCorrector for DictionaryCorrector {
    fn correct(&self, token: &str) -> String {
        let len = token.chars().count();
        if len < MIN_CORRECTABLE_LEN
            || is_stopword(token)
            || !token.chars().all(char::is_alphabetic)
        {
            return token.to_string();
        }

        let words = self.words.read();
        if words.contains(token) {
            return token.to_string();
        }

        let first = token.chars().next();
        let budget = Self::max_distance(len);
        let mut best: Option<(&str, usize)> = None;
        for word in words.iter() {
            // Typos rarely change the first letter; restricting on it keeps
            // unrelated short words from being pulled together.
            if word.chars().next() != first || word.chars().count().abs_diff(len) > budget {
                continue;
            }
            let distance = levenshtein(token, word);
            if distance <= budget && best.is_none_or(|(_, d)| distance < d) {
                best = Some((word.as_str(), distance));
            }
        }

        match best {
            Some((word, _)) => {
                tracing::trace!(from = token, to = word, "Spelling corrected");
                word.to_string()
            }
            None => token.to_string(),
        }
    }
}

/// Lowercase alphabetic words of `text`.
fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> DictionaryCorrector {
        DictionaryCorrector::new(["sticky leaves", "tiny white insects", "tomato", "whitefly", "caterpillar"])
    }

    #[test]
    fn known_words_pass_through() {
        let c = corrector();
        assert_eq!(c.correct("tomato"), "tomato");
        assert_eq!(c.correct("leaves"), "leaves");
    }

    #[test]
    fn single_typo_is_corrected() {
        // GIVEN: a one-letter typo of a dictionary word
        // WHEN: correcting
        // THEN: the dictionary word is returned
        let c = corrector();
        assert_eq!(c.correct("tomatto"), "tomato");
        assert_eq!(c.correct("stiky"), "sticky");
        assert_eq!(c.correct("catterpillar"), "caterpillar");
    }

    #[test]
    fn distant_words_are_left_alone() {
        let c = corrector();
        assert_eq!(c.correct("residue"), "residue");
        assert_eq!(c.correct("tire"), "tire");
        assert_eq!(c.correct("flat"), "flat");
    }

    #[test]
    fn short_tokens_stopwords_and_numbers_are_skipped() {
        let c = corrector();
        assert_eq!(c.correct("car"), "car");
        assert_eq!(c.correct("have"), "have");
        assert_eq!(c.correct("2030"), "2030");
    }

    #[test]
    fn added_words_become_correction_targets() {
        let c = corrector();
        assert_eq!(c.correct("thripss"), "thripss");
        c.add_words(["thrips"]);
        assert_eq!(c.correct("thripss"), "thrips");
        assert!(c.len() > 5);
    }
}
