//! Thesaurus-backed synonym expansion.
//!
//! A [`Thesaurus`] maps a term to its senses (groups of lemmas). The
//! [`SynonymExpander`] flattens those senses into one set that always contains
//! the term itself. Expansion is best effort: a failing or absent thesaurus
//! degrades to the identity set.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::{Error, Result};

/// Source of word senses.
pub trait Thesaurus: Send + Sync {
    /// Senses of `term`, each a list of lemmas. Unknown terms yield no senses.
    ///
    /// # Errors
    ///
    /// Implementations backed by external resources may fail; callers treat
    /// a failure as "no senses".
    fn senses_of(&self, term: &str) -> Result<Vec<Vec<String>>>;
}

/// Built-in agricultural sense groups.
///
/// Groups are closed under membership: every listed word maps back to the
/// same group.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticThesaurus;

impl StaticThesaurus {
    /// Lemmas grouped with `word`, or an empty slice.
    #[must_use]
    pub fn group(word: &str) -> &'static [&'static str] {
        match word {
            // insect group
            "insect" | "insects" | "bug" | "bugs" | "critter" | "critters" | "pest" | "pests" => {
                &["insect", "insects", "bug", "bugs", "critter", "critters", "pest", "pests"]
            }
            // small group
            "tiny" | "small" | "minute" | "little" | "microscopic" | "minuscule" => {
                &["tiny", "small", "minute", "little", "microscopic", "minuscule"]
            }
            // white group
            "white" | "whitish" | "pale white" => &["white", "whitish", "pale white"],
            // yellow group
            "yellowing" | "yellowed" | "chlorosis" | "chlorotic" | "yellow" => {
                &["yellowing", "yellowed", "chlorosis", "chlorotic", "yellow"]
            }
            // leaf group
            "leaf" | "leaves" | "foliage" => &["leaf", "leaves", "foliage"],
            // sticky group
            "sticky" | "tacky" | "gummy" | "syrupy" => &["sticky", "tacky", "gummy", "syrupy"],
            // mold group
            "mold" | "mould" | "mildew" | "fungus" => &["mold", "mould", "mildew", "fungus"],
            // wilt group
            "wilting" | "wilted" | "wilt" | "drooping" | "droopy" | "limp" => {
                &["wilting", "wilted", "wilt", "drooping", "droopy", "limp"]
            }
            // curl group
            "curled" | "curling" | "curl" | "crinkled" | "puckered" | "distorted" => {
                &["curled", "curling", "curl", "crinkled", "puckered", "distorted"]
            }
            // stunt group
            "stunted" | "stunting" | "dwarfed" => &["stunted", "stunting", "dwarfed"],
            // web group
            "webbing" | "web" | "webs" | "silk" | "cobweb" | "cobwebs" => {
                &["webbing", "web", "webs", "silk", "cobweb", "cobwebs"]
            }
            // speckle group
            "stippled" | "stippling" | "speckled" | "speckles" | "flecked" | "dotted" => {
                &["stippled", "stippling", "speckled", "speckles", "flecked", "dotted"]
            }
            // fluffy group
            "cottony" | "fluffy" | "woolly" | "fuzzy" => &["cottony", "fluffy", "woolly", "fuzzy"],
            // cluster group
            "masses" | "clusters" | "colonies" | "clumps" => {
                &["masses", "clusters", "colonies", "clumps"]
            }
            // chew group
            "chewed" | "eaten" | "gnawed" | "nibbled" => &["chewed", "eaten", "gnawed", "nibbled"],
            // hole group
            "holes" | "perforations" | "perforated" => &["holes", "perforations", "perforated"],
            // residue group
            "residue" | "coating" | "film" => &["residue", "coating", "film"],
            // corn group
            "corn" | "maize" => &["corn", "maize"],
            // eggplant group
            "eggplant" | "aubergine" | "brinjal" => &["eggplant", "aubergine", "brinjal"],
            // pepper group
            "pepper" | "peppers" | "capsicum" | "chili" => &["pepper", "peppers", "capsicum", "chili"],
            // greenhouse group
            "greenhouse" | "greenhouses" | "glasshouse" | "polytunnel" => {
                &["greenhouse", "greenhouses", "glasshouse", "polytunnel"]
            }
            // whitefly group
            "whitefly" | "whiteflies" | "white fly" | "white flies" => {
                &["whitefly", "whiteflies", "white fly", "white flies"]
            }
            // aphid group
            "aphid" | "aphids" | "greenfly" | "blackfly" | "plant lice" => {
                &["aphid", "aphids", "greenfly", "blackfly", "plant lice"]
            }
            // mite group
            "spider mite" | "spider mites" | "red spider" | "two spotted mite" => {
                &["spider mite", "spider mites", "red spider", "two spotted mite"]
            }
            // mealybug group
            "mealybug" | "mealybugs" | "mealy bug" | "mealy bugs" => {
                &["mealybug", "mealybugs", "mealy bug", "mealy bugs"]
            }
            _ => &[],
        }
    }
}

impl Thesaurus for StaticThesaurus {
    fn senses_of(&self, term: &str) -> Result<Vec<Vec<String>>> {
        let group = Self::group(term);
        if group.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![group.iter().map(|s| (*s).to_string()).collect()])
    }
}

/// Thesaurus loaded from a JSON file of the form `{"term": [["lemma", ...], ...]}`.
#[derive(Debug, Default, Clone)]
pub struct FileThesaurus {
    entries: HashMap<String, Vec<Vec<String>>>,
}

impl FileThesaurus {
    /// Load from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read thesaurus {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse from a JSON string. Keys are lowercased.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a term-to-senses object.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Vec<String>>> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(term, senses)| (term.to_lowercase(), senses))
            .collect();
        Ok(Self { entries })
    }

    /// Number of terms
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the thesaurus has no terms
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Thesaurus for FileThesaurus {
    fn senses_of(&self, term: &str) -> Result<Vec<Vec<String>>> {
        Ok(self.entries.get(term).cloned().unwrap_or_default())
    }
}

/// Chains thesauri; senses from every source are concatenated.
pub struct LayeredThesaurus {
    layers: Vec<Arc<dyn Thesaurus>>,
}

impl LayeredThesaurus {
    /// Create from ordered layers
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn Thesaurus>>) -> Self {
        Self { layers }
    }
}

impl Thesaurus for LayeredThesaurus {
    fn senses_of(&self, term: &str) -> Result<Vec<Vec<String>>> {
        let mut senses = Vec::new();
        for layer in &self.layers {
            senses.extend(layer.senses_of(term)?);
        }
        Ok(senses)
    }
}

/// Expands terms into synonym sets.
#[derive(Clone, Default)]
pub struct SynonymExpander {
    thesaurus: Option<Arc<dyn Thesaurus>>,
}

impl SynonymExpander {
    /// Create an expander; `None` makes every expansion the identity set.
    #[must_use]
    pub fn new(thesaurus: Option<Arc<dyn Thesaurus>>) -> Self {
        Self { thesaurus }
    }

    /// Whether a thesaurus is configured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.thesaurus.is_some()
    }

    /// Synonyms of `term`, always including `term` itself.
    ///
    /// Lemmas are lowercased and `_`/`-` joins become spaces.
    #[must_use]
    pub fn synonyms_of(&self, term: &str) -> BTreeSet<String> {
        let term = term.trim().to_lowercase();
        let mut out = BTreeSet::new();
        if let Some(thesaurus) = &self.thesaurus {
            match thesaurus.senses_of(&term) {
                Ok(senses) => {
                    for lemma in senses.into_iter().flatten() {
                        let lemma = lemma.to_lowercase().replace(['_', '-'], " ");
                        if !lemma.trim().is_empty() {
                            out.insert(lemma);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "Thesaurus lookup failed");
                }
            }
        }
        out.insert(term);
        out
    }
}

impl std::fmt::Debug for SynonymExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynonymExpander")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingThesaurus;

    impl Thesaurus for FailingThesaurus {
        fn senses_of(&self, _term: &str) -> Result<Vec<Vec<String>>> {
            Err(Error::Internal("thesaurus offline".into()))
        }
    }

    fn expander() -> SynonymExpander {
        SynonymExpander::new(Some(Arc::new(StaticThesaurus)))
    }

    #[test]
    fn static_groups_are_closed_under_membership() {
        // GIVEN: every word of every group reachable from a seed list
        // WHEN: looking up each member
        // THEN: it maps back to the same group
        for seed in ["bug", "tiny", "sticky", "corn", "webbing", "aphid", "mealybug"] {
            let group = StaticThesaurus::group(seed);
            assert!(!group.is_empty(), "{seed} has no group");
            for member in group {
                assert_eq!(StaticThesaurus::group(member), group, "{member} breaks group of {seed}");
            }
        }
    }

    #[test]
    fn insects_and_bugs_are_synonyms() {
        let syns = expander().synonyms_of("insects");
        assert!(syns.contains("bugs"));
        assert!(syns.contains("insects"));
    }

    #[test]
    fn honeydew_is_not_grouped_with_residue() {
        let syns = expander().synonyms_of("residue");
        assert!(!syns.contains("honeydew"));
        assert!(expander().synonyms_of("honeydew").len() == 1);
    }

    #[test]
    fn term_is_always_included() {
        let syns = expander().synonyms_of("Tractor");
        assert_eq!(syns.into_iter().collect::<Vec<_>>(), vec!["tractor".to_string()]);
    }

    #[test]
    fn disabled_expander_is_identity() {
        let expander = SynonymExpander::default();
        assert!(!expander.is_enabled());
        assert_eq!(expander.synonyms_of("bugs").len(), 1);
    }

    #[test]
    fn lookup_failure_degrades_to_identity() {
        let expander = SynonymExpander::new(Some(Arc::new(FailingThesaurus)));
        let syns = expander.synonyms_of("bugs");
        assert_eq!(syns.len(), 1);
        assert!(syns.contains("bugs"));
    }

    #[test]
    fn file_thesaurus_joins_become_spaces() {
        // GIVEN: WordNet-style lemma names with underscores and hyphens
        let thesaurus = FileThesaurus::from_json(
            r#"{"Aphid": [["plant_louse", "green-fly"], ["aphid"]]}"#,
        )
        .unwrap();
        assert_eq!(thesaurus.len(), 1);
        let expander = SynonymExpander::new(Some(Arc::new(thesaurus)));

        // WHEN: expanding the (case-insensitive) term
        let syns = expander.synonyms_of("aphid");

        // THEN: joins are spaces and senses are unioned
        assert!(syns.contains("plant louse"));
        assert!(syns.contains("green fly"));
        assert!(syns.contains("aphid"));
    }

    #[test]
    fn file_thesaurus_rejects_malformed_json() {
        assert!(FileThesaurus::from_json("[1, 2]").is_err());
    }

    #[test]
    fn layered_thesaurus_unions_layers() {
        let file = FileThesaurus::from_json(r#"{"bugs": [["beetles"]]}"#).unwrap();
        let layered = LayeredThesaurus::new(vec![Arc::new(StaticThesaurus), Arc::new(file)]);
        let syns = SynonymExpander::new(Some(Arc::new(layered))).synonyms_of("bugs");
        assert!(syns.contains("insects"));
        assert!(syns.contains("beetles"));
    }
}
