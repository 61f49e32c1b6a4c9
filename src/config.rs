//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Knowledge-base store configuration
    pub knowledge_base: KnowledgeBaseConfig,
    /// Matching engine configuration
    pub engine: EngineConfig,
    /// Embedding backend configuration
    pub embedding: EmbeddingConfig,
    /// Thesaurus configuration
    pub thesaurus: ThesaurusConfig,
    /// Generative annotation configuration
    pub annotation: AnnotationConfig,
    /// Report output configuration
    pub reports: ReportsConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AGROPEST_ prefix)
        figment = figment.merge(Env::prefixed("AGROPEST_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files feed `env:VAR` secret references below
        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Reject values the engine cannot run with
    fn validate(&self) -> Result<()> {
        if self.engine.max_description_length == 0 {
            return Err(Error::Config(
                "engine.max_description_length must be positive".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProvider::Hashing && self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive for the hashing provider".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Resolve a secret reference: `env:VAR_NAME` reads the variable, anything
/// else is taken literally. Unset variables and empty values resolve to `None`.
#[must_use]
pub fn resolve_secret(value: Option<&str>) -> Option<String> {
    let value = value?;
    let resolved = match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).ok()?,
        None => value.to_string(),
    };
    if resolved.trim().is_empty() { None } else { Some(resolved) }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Per-request analysis deadline
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(30),
            max_body_size: 64 * 1024,
        }
    }
}

/// Knowledge-base store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// JSON file holding every pest profile
    pub path: PathBuf,
    /// Write the built-in profiles when the file does not exist
    pub seed_defaults: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pest_knowledge.json"),
            seed_defaults: true,
        }
    }
}

/// Mapping from raw score to confidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    /// `1 / (1 + e^(-score/2))`
    #[default]
    Logistic,
    /// `min(score / 10, 1)`
    Linear,
}

/// Matching engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest accepted description, in characters
    pub max_description_length: usize,
    /// Score → confidence mapping, fixed for the process lifetime
    pub confidence: ConfidenceScale,
    /// Reduce tokens to their base form
    pub lemmatize: bool,
    /// Correct misspelled tokens against the domain dictionary
    pub spell_correct: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_description_length: 1000,
            confidence: ConfidenceScale::Logistic,
            lemmatize: true,
            spell_correct: true,
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Fuzzy matching only
    None,
    /// Offline feature-hashing vectors
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    Http,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which embedder to use
    pub provider: EmbeddingProvider,
    /// Endpoint base URL (`/embeddings` is appended)
    pub base_url: String,
    /// Model name sent with each request
    pub model: String,
    /// API key (literal or `env:VAR_NAME`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Vector size for the hashing provider
    pub dimension: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Texts per encode request during precompute
    pub batch_size: usize,
    /// Retry policy for the endpoint
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
            dimension: 384,
            timeout: Duration::from_secs(10),
            batch_size: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Thesaurus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThesaurusConfig {
    /// Expand terms through a thesaurus (off = identity expansion)
    pub enabled: bool,
    /// Optional JSON thesaurus (`term → [[lemma, ...], ...]`) layered over the built-in table
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for ThesaurusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Generative annotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Ask the generative model to explain the top candidates
    pub enabled: bool,
    /// API key (literal or `env:VAR_NAME`)
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Upper bound on the whole call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: Some("env:GEMINI_API_KEY".to_string()),
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Render a text report for identified pests
    pub enabled: bool,
    /// Write rendered reports to this directory (`None` = render only)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
