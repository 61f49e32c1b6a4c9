//! Pest knowledge-base data model
//!
//! Plain serde types describing one pest per knowledge-base key. The on-disk
//! JSON layout is a single object keyed by canonical pest name:
//!
//! ```json
//! {
//!   "whitefly": {
//!     "crops": ["tomato", "cotton"],
//!     "symptoms": ["sticky leaves", "tiny white insects"],
//!     "control_measures": { "chemical": ["insecticidal soap (1% solution)"] },
//!     "environmental_conditions": { "temperature": "20-30°C" },
//!     "appearance": { "color": ["white"], "size": ["tiny"] },
//!     "synonyms": ["white fly", "Bemisia tabaci"],
//!     "version": 1
//!   }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Knowledge base contents: canonical pest name → profile.
///
/// A `BTreeMap` keeps iteration order stable, which keeps ranking ties and
/// persisted files deterministic.
pub type KnowledgeMap = BTreeMap<String, PestProfile>;

/// Canonical form of a pest key: trimmed and lowercased.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One pest's traits and remedies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PestProfile {
    /// Crops this pest affects
    pub crops: BTreeSet<String>,
    /// Climate or region descriptors
    pub regions: BTreeSet<String>,
    /// Free-text symptom phrases, in authoring order
    pub symptoms: Vec<String>,
    /// Remedies grouped by category
    pub control_measures: ControlMeasures,
    /// Life-cycle notes
    pub life_cycle: String,
    /// Economic impact notes
    pub economic_impact: String,
    /// Conditions favouring the pest
    pub environmental_conditions: EnvironmentalConditions,
    /// Visual traits
    pub appearance: Appearance,
    /// Alternate common and scientific names
    pub synonyms: BTreeSet<String>,
    /// Revision counter, bumped on every update
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl PestProfile {
    /// A profile with neither symptoms nor crops can never be matched.
    #[must_use]
    pub fn is_matchable(&self) -> bool {
        self.symptoms.iter().any(|s| !s.trim().is_empty())
            || self.crops.iter().any(|c| !c.trim().is_empty())
    }

    /// Every free-text string the matcher compares against, without duplicates.
    ///
    /// `name` is the profile's key; it is included so name matching can use
    /// the same precomputed data as synonyms.
    #[must_use]
    pub fn match_texts(&self, name: &str) -> BTreeSet<String> {
        let mut texts = BTreeSet::new();
        texts.insert(name.to_string());
        texts.extend(self.symptoms.iter().cloned());
        texts.extend(self.crops.iter().cloned());
        texts.extend(self.synonyms.iter().cloned());
        texts.extend(self.environmental_conditions.values().map(str::to_string));
        texts.extend(self.appearance.color.iter().cloned());
        texts.extend(self.appearance.size.iter().cloned());
        texts.retain(|t| !t.trim().is_empty());
        texts
    }
}

/// Remedies by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlMeasures {
    /// Chemical treatments
    pub chemical: Vec<String>,
    /// Biological controls (predators, parasitoids)
    pub biological: Vec<String>,
    /// Cultural practices
    pub cultural: Vec<String>,
}

impl ControlMeasures {
    /// `(category, remedies)` pairs in display order.
    #[must_use]
    pub fn categories(&self) -> [(&'static str, &[String]); 3] {
        [
            ("chemical", &self.chemical),
            ("biological", &self.biological),
            ("cultural", &self.cultural),
        ]
    }
}

/// Environmental conditions favouring a pest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentalConditions {
    /// Temperature range, e.g. `20-30°C`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    /// Humidity descriptor, e.g. `High`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
    /// Soil descriptor, e.g. `Well-drained`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
}

impl EnvironmentalConditions {
    /// `(condition, value)` pairs that are set.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("temperature", self.temperature.as_deref()),
            ("humidity", self.humidity.as_deref()),
            ("soil_type", self.soil_type.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }

    /// Condition values that are set.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries().map(|(_, v)| v)
    }
}

/// Visual traits of a pest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    /// Color descriptors
    pub color: BTreeSet<String>,
    /// Size descriptors
    pub size: BTreeSet<String>,
}
