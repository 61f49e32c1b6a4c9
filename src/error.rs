//! Error types for agropest

use std::io;

use thiserror::Error;

/// Result type alias for agropest
pub type Result<T> = std::result::Result<T, Error>;

/// agropest errors
#[derive(Error, Debug)]
pub enum Error {
    /// Description rejected before analysis (empty, too long)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Profile violates the knowledge-base invariants
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// No profile under the requested key
    #[error("Pest not found: {0}")]
    ProfileNotFound(String),

    /// Knowledge store could not be read or written
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    /// Embedding model unavailable (recovered by fuzzy-only mode)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Embedding request or response failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generative annotation failure (always recovered locally)
    #[error("Annotation error: {0}")]
    Annotation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::InvalidProfile(_) | Self::Json(_) | Self::Yaml(_) => 400,
            Self::ProfileNotFound(_) => 404,
            Self::BackendUnavailable(_) => 503,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Whether retrying the same operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Io(_) | Self::Timeout(_))
    }
}
