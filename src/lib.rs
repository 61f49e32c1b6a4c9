//! Agropest
//!
//! Identifies crop pests from free-text symptom descriptions by matching
//! them against a knowledge base of pest profiles.
//!
//! # Features
//!
//! - **Hybrid matching**: semantic similarity over embeddings, with fuzzy
//!   string matching as a fallback when no embedding backend is reachable
//! - **Relatedness gate**: off-topic descriptions are rejected with guidance
//! - **Weighted scoring**: symptoms, crops, conditions, synonyms and
//!   appearance contribute evidence; results are ranked and cut off
//! - **Live knowledge base**: profiles can be replaced at runtime and are
//!   persisted atomically
//! - **HTTP + CLI**: `POST /identify-pest` plus an interactive analyzer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod annotate;
pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod guidance;
pub mod kb;
pub mod report;
pub mod scorer;
pub mod similarity;
pub mod synonyms;
pub mod text;

pub use engine::{Analysis, EngineBuilder, Identification, PestEngine, Verdict};
pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        _ => subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("tracing already initialized: {e}")))
}
