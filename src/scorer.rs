//! Evidence accumulation and ranking.
//!
//! Each profile is scored independently against one normalized query:
//!
//! | Evidence                  | Weight        |
//! |---------------------------|---------------|
//! | symptom, direct           | +2.0 each     |
//! | symptom, through synonyms | +1.5 each     |
//! | crop                      | +1.0 each     |
//! | environmental condition   | +0.5 each     |
//! | pest name or synonym      | +1.5 once     |
//! | appearance color / size   | +1.0 each     |
//!
//! More than one distinct symptom multiplies the total by 1.2. A profile with
//! neither a symptom nor a crop match scores 0 whatever else matched.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use agropest_core::PestProfile;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::config::ConfidenceScale;
use crate::similarity::{COSINE_THRESHOLD, FUZZY_THRESHOLD, SemanticView, fuzzy};
use crate::synonyms::SynonymExpander;
use crate::text::{NormalizedQuery, Normalizer, Phrase};

const SYMPTOM_WEIGHT: f64 = 2.0;
const SYMPTOM_SYNONYM_WEIGHT: f64 = 1.5;
const CROP_WEIGHT: f64 = 1.0;
const CONDITION_WEIGHT: f64 = 0.5;
const NAME_WEIGHT: f64 = 1.5;
const APPEARANCE_WEIGHT: f64 = 1.0;
const MULTI_SYMPTOM_BOOST: f64 = 1.2;

/// Candidates scoring below this fraction of the top score are dropped.
pub const RELATIVE_CUTOFF: f64 = 0.7;
/// At most this many candidates are returned.
pub const MAX_CANDIDATES: usize = 3;

/// One piece of matched evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEvidence {
    /// Knowledge-base string that matched
    pub text: String,
    /// Similarity that triggered the match; absent for literal containment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Matched only through synonyms
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub via_synonym: bool,
}

impl MatchedEvidence {
    fn literal(text: &str) -> Self {
        Self {
            text: text.to_string(),
            similarity: None,
            via_synonym: false,
        }
    }
}

/// Matched evidence by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matches {
    /// Matched symptom phrases
    pub symptoms: Vec<MatchedEvidence>,
    /// Matched crops
    pub crops: Vec<MatchedEvidence>,
    /// Matched environmental condition values
    pub conditions: Vec<MatchedEvidence>,
    /// Matched pest name or synonym
    pub synonyms: Vec<MatchedEvidence>,
    /// Matched appearance descriptors
    pub appearance: Vec<MatchedEvidence>,
}

/// Score of one profile against one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Canonical pest name
    pub pest: String,
    /// Accumulated evidence weight, never negative
    pub score: f64,
    /// Score mapped into `[0, 1]`
    pub confidence: f64,
    /// Evidence behind the score
    pub matches: Matches,
}

/// Map a raw score to a confidence in `[0, 1]`.
#[must_use]
pub fn confidence(scale: ConfidenceScale, score: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    let value = match scale {
        ConfidenceScale::Logistic => 1.0 / (1.0 + (-score / 2.0).exp()),
        ConfidenceScale::Linear => score / 10.0,
    };
    value.clamp(0.0, 1.0)
}

/// Keep positive scores, best first (ties by name), within
/// [`RELATIVE_CUTOFF`] of the best, at most [`MAX_CANDIDATES`].
#[must_use]
pub fn rank(mut results: Vec<MatchResult>) -> Vec<MatchResult> {
    results.retain(|r| r.score > 0.0);
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.pest.cmp(&b.pest))
    });
    let Some(top) = results.first().map(|r| r.score) else {
        return results;
    };
    results.retain(|r| r.score >= RELATIVE_CUTOFF * top);
    results.truncate(MAX_CANDIDATES);
    results
}

/// How a phrase matched the query.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PhraseMatch {
    similarity: Option<f64>,
    via_synonym: bool,
}

/// Per-request matching context.
struct QueryContext<'q> {
    query: &'q NormalizedQuery,
    semantic: Option<&'q SemanticView<'q>>,
}

/// Scores profiles against a query.
pub struct Scorer<'a> {
    normalizer: &'a Normalizer,
    expander: &'a SynonymExpander,
    scale: ConfidenceScale,
}

impl<'a> Scorer<'a> {
    /// Create a scorer
    #[must_use]
    pub fn new(normalizer: &'a Normalizer, expander: &'a SynonymExpander, scale: ConfidenceScale) -> Self {
        Self {
            normalizer,
            expander,
            scale,
        }
    }

    /// Score every profile. A profile that fails to score is logged and
    /// left out.
    pub fn score_all<'p, I>(
        &self,
        query: &NormalizedQuery,
        profiles: I,
        semantic: Option<&SemanticView<'_>>,
    ) -> Vec<MatchResult>
    where
        I: IntoIterator<Item = (&'p String, &'p PestProfile)>,
    {
        profiles
            .into_iter()
            .filter_map(|(name, profile)| match self.score(query, name, profile, semantic) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(pest = %name, error = %e, "Skipping profile that failed to score");
                    None
                }
            })
            .collect()
    }

    /// Score a single profile.
    ///
    /// # Errors
    ///
    /// Fails when a semantic comparison fails (dimension mismatch).
    pub fn score(
        &self,
        query: &NormalizedQuery,
        name: &str,
        profile: &PestProfile,
        semantic: Option<&SemanticView<'_>>,
    ) -> Result<MatchResult> {
        let ctx = QueryContext { query, semantic };
        let mut matches = Matches::default();
        let mut score = 0.0;

        let mut seen = BTreeSet::new();
        for symptom in &profile.symptoms {
            if !seen.insert(symptom.trim().to_lowercase()) {
                continue;
            }
            if let Some(m) = self.match_phrase(&ctx, symptom)? {
                score += if m.via_synonym { SYMPTOM_SYNONYM_WEIGHT } else { SYMPTOM_WEIGHT };
                matches.symptoms.push(MatchedEvidence {
                    text: symptom.clone(),
                    similarity: m.similarity,
                    via_synonym: m.via_synonym,
                });
            }
        }

        for crop in &profile.crops {
            if let Some(similarity) = self.match_term(&ctx, crop)? {
                score += CROP_WEIGHT;
                matches.crops.push(MatchedEvidence {
                    text: crop.clone(),
                    similarity,
                    via_synonym: false,
                });
            }
        }

        for value in profile.environmental_conditions.values() {
            let phrase = self.normalizer.phrase(value);
            if query.contains_phrase(&phrase) {
                score += CONDITION_WEIGHT;
                matches.conditions.push(MatchedEvidence::literal(value));
            }
        }

        let names = std::iter::once(name).chain(profile.synonyms.iter().map(String::as_str));
        for candidate in names {
            if let Some(similarity) = self.match_term(&ctx, candidate)? {
                score += NAME_WEIGHT;
                matches.synonyms.push(MatchedEvidence {
                    text: candidate.to_string(),
                    similarity,
                    via_synonym: false,
                });
                break;
            }
        }

        if let Some(color) = &query.color {
            if contains_ignore_case(&profile.appearance.color, color) {
                score += APPEARANCE_WEIGHT;
                matches.appearance.push(MatchedEvidence::literal(color));
            }
        }
        if let Some(size) = &query.size {
            if contains_ignore_case(&profile.appearance.size, size) {
                score += APPEARANCE_WEIGHT;
                matches.appearance.push(MatchedEvidence::literal(size));
            }
        }

        if matches.symptoms.len() > 1 {
            score *= MULTI_SYMPTOM_BOOST;
        }
        if matches.symptoms.is_empty() && matches.crops.is_empty() {
            score = 0.0;
        }

        debug!(
            pest = name,
            score,
            symptoms = matches.symptoms.len(),
            crops = matches.crops.len(),
            "Profile scored"
        );
        Ok(MatchResult {
            pest: name.to_string(),
            score,
            confidence: confidence(self.scale, score),
            matches,
        })
    }

    /// Symptom match: containment, fuzzy coverage or whole-query cosine,
    /// then synonym-mediated coverage.
    fn match_phrase(&self, ctx: &QueryContext<'_>, source: &str) -> Result<Option<PhraseMatch>> {
        let phrase = self.normalizer.phrase(source);
        if phrase.terms.is_empty() {
            return Ok(None);
        }
        if ctx.query.contains_phrase(&phrase) {
            return Ok(Some(PhraseMatch {
                similarity: None,
                via_synonym: false,
            }));
        }

        let coverage = self.coverage(ctx.query, &phrase);
        let cosine = match ctx.semantic {
            Some(view) => view.text_cosine(source)?,
            None => None,
        };
        if coverage > FUZZY_THRESHOLD || cosine.is_some_and(|c| c > COSINE_THRESHOLD) {
            return Ok(Some(PhraseMatch {
                similarity: Some(best_similarity(coverage, cosine)),
                via_synonym: false,
            }));
        }

        if self.expander.is_enabled() && self.covered_with_synonyms(ctx.query, &phrase) {
            return Ok(Some(PhraseMatch {
                similarity: None,
                via_synonym: true,
            }));
        }
        Ok(None)
    }

    /// Crop/name-style match: containment, fuzzy coverage, or any query word
    /// close to the term. Returns the triggering similarity.
    fn match_term(&self, ctx: &QueryContext<'_>, term: &str) -> Result<Option<Option<f64>>> {
        let phrase = self.normalizer.phrase(term);
        if phrase.terms.is_empty() {
            return Ok(None);
        }
        if ctx.query.contains_phrase(&phrase) {
            return Ok(Some(None));
        }
        let coverage = self.coverage(ctx.query, &phrase);
        if coverage > FUZZY_THRESHOLD {
            return Ok(Some(Some(coverage / 100.0)));
        }
        if let Some(view) = ctx.semantic {
            if let Some(sim) = view.best_token_cosine(term)? {
                if sim > COSINE_THRESHOLD {
                    return Ok(Some(Some(sim)));
                }
            }
        }
        Ok(None)
    }

    /// Weakest per-term best ratio; an identical lemma counts as 100.
    fn coverage(&self, query: &NormalizedQuery, phrase: &Phrase) -> f64 {
        fuzzy::coverage(
            phrase
                .terms
                .iter()
                .map(|(word, token)| term_ratio(query, word, token)),
        )
    }

    /// Every term matches directly or through synonyms of either side, and
    /// at least one only through synonyms.
    fn covered_with_synonyms(&self, query: &NormalizedQuery, phrase: &Phrase) -> bool {
        let mut used_synonym = false;
        for (word, token) in &phrase.terms {
            if term_ratio(query, word, token) > FUZZY_THRESHOLD {
                continue;
            }
            if self.synonym_hit(query, word) {
                used_synonym = true;
            } else {
                return false;
            }
        }
        used_synonym
    }

    fn synonym_hit(&self, query: &NormalizedQuery, word: &str) -> bool {
        // Phrase side: a synonym of the term occurs in the query
        let forward = self
            .expander
            .synonyms_of(word)
            .iter()
            .filter(|s| s.as_str() != word)
            .any(|s| query.contains_phrase(&self.normalizer.phrase(s)));
        if forward {
            return true;
        }
        // Query side: the term is a synonym of a query word
        let lemma = self.normalizer.lemma(word);
        query.content_terms().any(|(qword, _)| {
            self.expander
                .synonyms_of(qword)
                .iter()
                .any(|s| s == word || self.normalizer.lemma(s) == lemma)
        })
    }
}

/// Best match of one phrase term against the query's content terms.
fn term_ratio(query: &NormalizedQuery, word: &str, token: &str) -> f64 {
    query
        .content_terms()
        .map(|(qword, qtoken)| {
            if qtoken == token {
                100.0
            } else {
                fuzzy::ratio(word, qword)
            }
        })
        .fold(0.0, f64::max)
}

fn best_similarity(coverage: f64, cosine: Option<f64>) -> f64 {
    let fuzzy = coverage / 100.0;
    cosine.map_or(fuzzy, |c| fuzzy.max(c))
}

fn contains_ignore_case(set: &BTreeSet<String>, value: &str) -> bool {
    set.iter().any(|v| v.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::kb::default_knowledge;
    use crate::synonyms::StaticThesaurus;
    use crate::text::SnowballLemmatizer;

    struct Fixture {
        normalizer: Normalizer,
        expander: SynonymExpander,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                normalizer: Normalizer::new(None, Some(Arc::new(SnowballLemmatizer::english())), 1000),
                expander: SynonymExpander::new(Some(Arc::new(StaticThesaurus))),
            }
        }

        fn scorer(&self) -> Scorer<'_> {
            Scorer::new(&self.normalizer, &self.expander, ConfidenceScale::Logistic)
        }

        fn score(&self, text: &str, name: &str, profile: &PestProfile) -> MatchResult {
            let query = self.normalizer.normalize(text).unwrap();
            self.scorer().score(&query, name, profile, None).unwrap()
        }
    }

    fn profile(json: &str) -> PestProfile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn whitefly_description_accumulates_expected_evidence() {
        // GIVEN: the built-in whitefly profile
        let fixture = Fixture::new();
        let kb = default_knowledge().unwrap();

        // WHEN: scoring the canonical whitefly description
        let result = fixture.score(
            "My tomato leaves have tiny white bugs and sticky residue",
            "whitefly",
            &kb["whitefly"],
        );

        // THEN: three symptoms (one via synonyms), one crop, color and size
        let symptoms: Vec<_> = result.matches.symptoms.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(symptoms, vec!["sticky leaves", "tiny white insects", "white bugs"]);
        assert!(result.matches.symptoms[1].via_synonym);
        assert_eq!(result.matches.crops.len(), 1);
        assert_eq!(result.matches.appearance.len(), 2);
        assert!((result.score - (2.0 + 1.5 + 2.0 + 1.0 + 1.0 + 1.0) * 1.2).abs() < 1e-9);
    }

    #[test]
    fn condition_only_profile_scores_zero() {
        // GIVEN: a profile whose only overlap with the query is a condition
        let fixture = Fixture::new();
        let p = profile(
            r#"{"crops": ["rice"], "symptoms": ["dead hearts"],
                "environmental_conditions": {"humidity": "High"}}"#,
        );

        // WHEN: the query mentions the condition only
        let result = fixture.score("humidity has been high lately", "stem borer", &p);

        // THEN: the condition is recorded but the score is forced to zero
        assert_eq!(result.matches.conditions.len(), 1);
        assert!(result.score.abs() < f64::EPSILON);
        assert!(result.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn exact_name_adds_name_weight_once() {
        // GIVEN: a profile with a crop, a name and a synonym all present in the query
        let fixture = Fixture::new();
        let p = profile(r#"{"crops": ["maize"], "synonyms": ["fall armyworm"]}"#);

        let result = fixture.score("armyworm in my maize, fall armyworm for sure", "armyworm", &p);

        // THEN: crop (+1.0) and name (+1.5), name counted once
        assert_eq!(result.matches.synonyms.len(), 1);
        assert!((result.score - 2.5).abs() < 1e-9);
    }

    #[test]
    fn multiple_symptoms_apply_boost() {
        let fixture = Fixture::new();
        let p = profile(r#"{"symptoms": ["fine webbing", "stippled leaves"]}"#);
        let result = fixture.score("fine webbing and stippled leaves", "spider mite", &p);
        assert!((result.score - 4.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn duplicate_symptoms_count_once() {
        let fixture = Fixture::new();
        let p = profile(r#"{"symptoms": ["fine webbing", "Fine webbing"]}"#);
        let result = fixture.score("fine webbing everywhere", "spider mite", &p);
        assert_eq!(result.matches.symptoms.len(), 1);
        assert!((result.score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_symptom_match_records_similarity() {
        let fixture = Fixture::new();
        let p = profile(r#"{"symptoms": ["yellowing leaves"]}"#);
        let result = fixture.score("the leaves are yelowing", "whitefly", &p);
        let evidence = &result.matches.symptoms[0];
        assert!(!evidence.via_synonym);
        assert!(evidence.similarity.unwrap() > 0.7);
    }

    #[test]
    fn synonyms_disabled_means_no_mediated_matches() {
        let fixture = Fixture {
            expander: SynonymExpander::default(),
            ..Fixture::new()
        };
        let p = profile(r#"{"symptoms": ["tiny white insects"]}"#);
        let result = fixture.score("tiny white bugs", "whitefly", &p);
        assert!(result.matches.symptoms.is_empty());
    }

    #[test]
    fn scoring_is_idempotent() {
        let fixture = Fixture::new();
        let kb = default_knowledge().unwrap();
        let query = fixture.normalizer.normalize("curled leaves with sticky honeydew on cabbage").unwrap();
        let scorer = fixture.scorer();
        let first = scorer.score_all(&query, &kb, None);
        let second = scorer.score_all(&query, &kb, None);
        assert_eq!(first, second);
    }

    #[test]
    fn confidence_mappings_stay_in_unit_interval() {
        for score in [0.0, 0.5, 2.0, 10.2, 50.0] {
            for scale in [ConfidenceScale::Logistic, ConfidenceScale::Linear] {
                let c = confidence(scale, score);
                assert!((0.0..=1.0).contains(&c), "{scale:?} {score} -> {c}");
            }
        }
        assert!((confidence(ConfidenceScale::Linear, 5.0) - 0.5).abs() < 1e-9);
        assert!(confidence(ConfidenceScale::Logistic, 10.2) > 0.99);
    }

    fn result(pest: &str, score: f64) -> MatchResult {
        MatchResult {
            pest: pest.to_string(),
            score,
            confidence: confidence(ConfidenceScale::Logistic, score),
            matches: Matches::default(),
        }
    }

    #[test]
    fn rank_drops_weak_and_zero_candidates() {
        // GIVEN: a clear winner, a near second, a weak third and a zero
        let ranked = rank(vec![
            result("aphid", 1.0),
            result("whitefly", 10.2),
            result("mealybug", 0.0),
            result("spider mite", 8.0),
        ]);

        // THEN: only candidates within 70% of the top remain, best first
        let names: Vec<_> = ranked.iter().map(|r| r.pest.as_str()).collect();
        assert_eq!(names, vec!["whitefly", "spider mite"]);
    }

    #[test]
    fn rank_breaks_ties_by_name_and_caps_at_three() {
        let ranked = rank(vec![
            result("d", 3.0),
            result("c", 3.0),
            result("b", 3.0),
            result("a", 3.0),
        ]);
        let names: Vec<_> = ranked.iter().map(|r| r.pest.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn rank_of_nothing_is_empty() {
        assert!(rank(vec![result("aphid", 0.0)]).is_empty());
    }
}
