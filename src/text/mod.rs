//! Text processing: normalization, spelling correction, lemmatization.

pub mod lemma;
pub mod normalize;
pub mod spelling;
pub mod stopwords;

pub use lemma::{Lemmatizer, SnowballLemmatizer};
pub use normalize::{NormalizedQuery, Normalizer, Phrase};
pub use spelling::{DictionaryCorrector, SpellCorrector};
pub use stopwords::is_stopword;

/// Fixed domain vocabulary seeded into the spelling dictionary and the
/// relatedness vocabulary, independent of what the knowledge base holds.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "aphid",
    "beetle",
    "bug",
    "bugs",
    "cabbage",
    "caterpillar",
    "chewed",
    "control",
    "corn",
    "cotton",
    "crop",
    "cucumber",
    "damage",
    "eggplant",
    "flower",
    "fruit",
    "holes",
    "honeydew",
    "infestation",
    "infested",
    "insect",
    "insects",
    "larva",
    "leaf",
    "leaves",
    "lettuce",
    "maize",
    "mealybug",
    "mite",
    "mold",
    "pepper",
    "pest",
    "plant",
    "root",
    "seedling",
    "spider mite",
    "spots",
    "spray",
    "stem",
    "sticky",
    "stunted",
    "tomato",
    "trap",
    "webbing",
    "whitefly",
    "wilting",
    "worm",
    "yellowing",
];
