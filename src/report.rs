//! Plain-text identification reports.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use agropest_core::PestProfile;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::Result;
use crate::scorer::MatchResult;

/// Report line width
pub const WIDTH: usize = 80;

/// Render a report for an identified pest. `candidates` must be ranked and
/// non-empty; the first one is the identified pest.
#[must_use]
pub fn render(
    description: &str,
    candidates: &[MatchResult],
    profile: Option<&PestProfile>,
    explanation: Option<&str>,
    generated_at: DateTime<Utc>,
) -> String {
    let mut lines: Vec<String> = vec![
        "Pest Identification Report".to_string(),
        "=".repeat(26),
        format!("Description: {description}"),
    ];

    match candidates.first() {
        Some(top) => {
            lines.push(format!("Identified Pest: {}", top.pest));
            lines.push(format!("Confidence: {:.2}", top.confidence));
        }
        None => lines.push("Identified Pest: Unknown".to_string()),
    }

    if !candidates.is_empty() {
        lines.push(String::new());
        lines.push("Possible Pests:".to_string());
        for c in candidates {
            lines.push(format!(
                "  - {} ({:.0}%, score {:.2})",
                c.pest,
                c.confidence * 100.0,
                c.score
            ));
        }
    }

    if let Some(text) = explanation {
        lines.push(String::new());
        lines.push("AI Analysis:".to_string());
        lines.extend(text.lines().map(|l| format!("  {l}")));
    }

    if let Some(p) = profile {
        lines.push(String::new());
        lines.push("Details:".to_string());
        push_list(&mut lines, "Crops", p.crops.iter());
        push_list(&mut lines, "Regions", p.regions.iter());
        push_list(&mut lines, "Symptoms", p.symptoms.iter());
        if !p.life_cycle.is_empty() {
            lines.push(format!("  Life Cycle: {}", p.life_cycle));
        }
        if !p.economic_impact.is_empty() {
            lines.push(format!("  Economic Impact: {}", p.economic_impact));
        }

        let conditions: Vec<_> = p.environmental_conditions.entries().collect();
        if !conditions.is_empty() {
            lines.push("  Environmental Conditions:".to_string());
            for (key, value) in conditions {
                lines.push(format!("    - {}: {value}", title_case(key)));
            }
        }

        let measures: Vec<_> = p
            .control_measures
            .categories()
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .collect();
        if !measures.is_empty() {
            lines.push("  Control Measures:".to_string());
            for (category, items) in measures {
                lines.push(format!("    - {}: {}", title_case(category), items.join("; ")));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")));

    let mut out = String::new();
    for line in &lines {
        for wrapped in wrap(line, WIDTH) {
            let _ = writeln!(out, "{wrapped}");
        }
    }
    out
}

/// Write `report` to `directory/pest_report_<id>.txt`.
///
/// # Errors
///
/// Fails if the directory cannot be created or the file written.
pub fn save(directory: &Path, report: &str) -> Result<PathBuf> {
    fs::create_dir_all(directory)?;
    let path = directory.join(format!("pest_report_{}.txt", uuid::Uuid::new_v4().simple()));
    fs::write(&path, report)?;
    info!(path = %path.display(), "Report saved");
    Ok(path)
}

fn push_list<'a>(lines: &mut Vec<String>, label: &str, items: impl Iterator<Item = &'a String>) {
    let items: Vec<&str> = items.map(String::as_str).collect();
    if !items.is_empty() {
        lines.push(format!("  {label}: {}", items.join(", ")));
    }
}

/// `soil_type` -> `Soil Type`
fn title_case(key: &str) -> String {
    key.split('_')
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word-wrap `line` at `width` columns. Continuation lines keep the
/// original indentation plus two spaces. Words longer than a line are
/// left whole.
fn wrap(line: &str, width: usize) -> Vec<String> {
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }
    let indent_len = line.len() - line.trim_start().len();
    let indent = &line[..indent_len];
    let continuation = format!("{indent}  ");

    let mut out = Vec::new();
    let mut current = indent.to_string();
    let mut current_len = current.chars().count();
    let mut at_line_start = true;
    for word in line.split_whitespace() {
        let word_len = word.chars().count();
        if !at_line_start && current_len + 1 + word_len > width {
            out.push(std::mem::take(&mut current));
            current.push_str(&continuation);
            current_len = continuation.chars().count();
            at_line_start = true;
        }
        if !at_line_start {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
        at_line_start = false;
    }
    out.push(current);
    out
}
