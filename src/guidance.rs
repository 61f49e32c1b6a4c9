//! User-facing hints returned alongside results.

use serde::{Deserialize, Serialize};

use crate::text::NormalizedQuery;

/// Which situation a hint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceKind {
    /// Description did not look pest-related
    OffTopic,
    /// Pest-related, but no profile matched
    NoMatch,
    /// A pest was identified; tips to sharpen the next description
    Refine,
}

const KEY_DETAILS: [&str; 3] = [
    "- Symptoms (e.g., yellow leaves, holes, sticky residue)",
    "- Crops affected (e.g., tomato, maize)",
    "- Pest traits (e.g., color, size, flying)",
];

/// Example description echoing whatever traits the user already gave.
#[must_use]
pub fn example_description(query: Option<&NormalizedQuery>) -> String {
    let size = query.and_then(|q| q.size.as_deref()).unwrap_or("tiny");
    let color = query.and_then(|q| q.color.as_deref()).unwrap_or("white");
    format!("My tomato leaves have {size} {color} bugs.")
}

/// Guidance lines for `kind`, parameterized by detected attributes.
#[must_use]
pub fn guidance(kind: GuidanceKind, query: Option<&NormalizedQuery>) -> Vec<String> {
    let example = example_description(query);
    let mut lines = match kind {
        GuidanceKind::OffTopic => vec![
            "This doesn't seem pest-related.".to_string(),
            format!("Try describing issues like '{example}'"),
            "Key details to include:".to_string(),
        ],
        GuidanceKind::NoMatch => vec![
            format!("Couldn't identify a pest. Please provide more details, e.g., '{example}'"),
            "Key details to include:".to_string(),
        ],
        GuidanceKind::Refine => vec!["For better accuracy, include details like:".to_string()],
    };
    lines.extend(KEY_DETAILS.iter().map(|s| (*s).to_string()));

    if let Some(damage) = query.and_then(|q| q.damage_type.as_deref()) {
        if kind != GuidanceKind::Refine {
            lines.push(format!(
                "You mentioned '{damage}'; say which crop shows it and what the pest looks like."
            ));
        }
    }
    if let Some(question) = query.and_then(missing_trait_question) {
        lines.push(question);
    }
    if kind == GuidanceKind::Refine {
        lines.push(format!("Example: '{example}'"));
    }
    lines
}

/// Ask for the appearance trait the user left out when they gave the other.
fn missing_trait_question(query: &NormalizedQuery) -> Option<String> {
    match (query.color.as_deref(), query.size.as_deref()) {
        (Some(color), None) => Some(format!(
            "You said they are {color}; what size are they (e.g., tiny, small, large)?"
        )),
        (None, Some(size)) => Some(format!(
            "You said they are {size}; what color are they (e.g., white, green, black)?"
        )),
        _ => None,
    }
}
