//! Optional generative explanation of a result.
//!
//! Runs after ranking and never influences it. Every failure (disabled,
//! missing key, timeout, HTTP or parse error) collapses into
//! [`FALLBACK_EXPLANATION`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{AnnotationConfig, resolve_secret};
use crate::scorer::MatchResult;
use crate::{Error, Result};

/// Explanation used whenever the annotator cannot produce one.
pub const FALLBACK_EXPLANATION: &str = "Unable to get AI response";

/// Produces a free-text explanation for a ranked result.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Explain `candidates` for `description`.
    ///
    /// # Errors
    ///
    /// Any backend failure; callers substitute [`FALLBACK_EXPLANATION`].
    async fn explain(&self, description: &str, candidates: &[MatchResult]) -> Result<String>;
}

/// Prompt sent to the generative model.
#[must_use]
pub fn build_prompt(description: &str, candidates: &[MatchResult]) -> String {
    let mut prompt = format!(
        "A farmer describes a crop problem: \"{description}\".\n\
         Based on this description, explain the likely pest issue and suggest practical next steps."
    );
    if !candidates.is_empty() {
        let names: Vec<String> = candidates
            .iter()
            .map(|c| format!("{} ({:.0}%)", c.pest, c.confidence * 100.0))
            .collect();
        prompt.push_str(&format!("\nA matching engine suggested: {}.", names.join(", ")));
    }
    prompt
}

/// Google Generative Language (`generateContent`) client.
pub struct GeminiAnnotator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiAnnotator {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AnnotationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Annotation(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: resolve_secret(config.api_key.as_deref()),
        })
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn extract_text(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Annotator for GeminiAnnotator {
    async fn explain(&self, description: &str, candidates: &[MatchResult]) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Annotation("no API key configured".to_string()))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(description, candidates) }] }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let data = response.json::<Value>().await?;
        debug!(model = %self.model, "Annotation received");
        extract_text(&data).ok_or_else(|| Error::Annotation("response had no text".to_string()))
    }
}

/// Run `annotator` under `timeout`, falling back on any failure.
pub async fn explain_or_fallback(
    annotator: &dyn Annotator,
    timeout: std::time::Duration,
    description: &str,
    candidates: &[MatchResult],
) -> String {
    match tokio::time::timeout(timeout, annotator.explain(description, candidates)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "Annotation failed");
            FALLBACK_EXPLANATION.to_string()
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis(), "Annotation timed out");
            FALLBACK_EXPLANATION.to_string()
        }
    }
}
