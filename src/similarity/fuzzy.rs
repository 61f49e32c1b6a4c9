//! Edit-distance similarity, always available.

use strsim::normalized_levenshtein;

/// Fuzzy ratio a pair must strictly exceed to count as a match.
pub const FUZZY_THRESHOLD: f64 = 70.0;

/// Levenshtein similarity ratio in `[0, 100]`.
#[must_use]
pub fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// Whether `a` and `b` are a fuzzy match
#[must_use]
pub fn is_match(a: &str, b: &str) -> bool {
    ratio(a, b) > FUZZY_THRESHOLD
}

/// How well a phrase is covered given each term's best ratio against the
/// query: the weakest of them. An empty phrase is not covered at all.
#[must_use]
pub fn coverage<I>(term_ratios: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    term_ratios
        .into_iter()
        .reduce(f64::min)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_full_ratio() {
        assert!((ratio("sticky", "sticky") - 100.0).abs() < f64::EPSILON);
        assert!(ratio("", "") > 99.0);
    }

    #[test]
    fn threshold_is_strict() {
        // GIVEN: 3 of 10 characters differ, ratio exactly 70
        // THEN: not a match
        assert!((ratio("abcdefghij", "abcdefgxyz") - 70.0).abs() < 1e-9);
        assert!(!is_match("abcdefghij", "abcdefgxyz"));
        assert!(is_match("yellowing", "yelowing"));
    }

    #[test]
    fn unrelated_words_do_not_match() {
        assert!(!is_match("tire", "tiny"));
        assert!(!is_match("whitefly", "white"));
        assert!(!is_match("car", "crop"));
    }

    #[test]
    fn coverage_is_weakest_term() {
        let full = coverage([100.0, 100.0]);
        assert!((full - 100.0).abs() < f64::EPSILON);
        let partial = coverage([100.0, ratio("insects", "bugs"), 90.0]);
        assert!(partial <= FUZZY_THRESHOLD);
    }

    #[test]
    fn empty_phrase_has_no_coverage() {
        assert!(coverage(std::iter::empty()).abs() < f64::EPSILON);
    }
}
