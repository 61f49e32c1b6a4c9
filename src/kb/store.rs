//! Knowledge-base persistence.

use std::fs;
use std::path::{Path, PathBuf};

use agropest_core::{KnowledgeMap, canonical_name};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Built-in knowledge base written when no store file exists yet.
pub const DEFAULT_KNOWLEDGE: &str = include_str!("../../data/default_knowledge.json");

/// Parse the built-in knowledge base.
///
/// # Errors
///
/// Fails only if the embedded JSON is malformed.
pub fn default_knowledge() -> Result<KnowledgeMap> {
    Ok(serde_json::from_str(DEFAULT_KNOWLEDGE)?)
}

/// Whole-map persistence for pest profiles. Single writer, last write wins.
pub trait KnowledgeStore: Send + Sync {
    /// Read every profile
    ///
    /// # Errors
    ///
    /// Fails if the backing storage cannot be read or parsed.
    fn load_all(&self) -> Result<KnowledgeMap>;

    /// Replace the stored map with `profiles`
    ///
    /// # Errors
    ///
    /// Fails if the backing storage cannot be written.
    fn save_all(&self, profiles: &KnowledgeMap) -> Result<()>;
}

/// JSON file store. Writes go to a sibling temp file which is then renamed
/// over the target, so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    seed_defaults: bool,
}

impl JsonFileStore {
    /// Create a store over `path`. With `seed_defaults`, a missing file is
    /// created from the built-in knowledge base on first load.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, seed_defaults: bool) -> Self {
        Self {
            path: path.into(),
            seed_defaults,
        }
    }

    /// Store file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KnowledgeStore for JsonFileStore {
    fn load_all(&self) -> Result<KnowledgeMap> {
        if !self.path.exists() {
            if !self.seed_defaults {
                warn!(path = %self.path.display(), "Knowledge base file missing, starting empty");
                return Ok(KnowledgeMap::new());
            }
            let defaults = default_knowledge()?;
            self.save_all(&defaults)?;
            info!(
                path = %self.path.display(),
                profiles = defaults.len(),
                "Seeded default knowledge base"
            );
            return Ok(defaults);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::KnowledgeBase(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        let raw: KnowledgeMap = serde_json::from_str(&content).map_err(|e| {
            Error::KnowledgeBase(format!("Failed to parse {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), profiles = raw.len(), "Knowledge base read");
        Ok(raw)
    }

    fn save_all(&self, profiles: &KnowledgeMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(profiles)?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| {
            Error::KnowledgeBase(format!("Failed to write {}: {e}", temp.display()))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            Error::KnowledgeBase(format!("Failed to replace {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), profiles = profiles.len(), "Knowledge base saved");
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Mutex<KnowledgeMap>,
}

impl MemoryStore {
    /// Create a store holding `profiles` (keys are canonicalized)
    #[must_use]
    pub fn new(profiles: KnowledgeMap) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|(name, profile)| (canonical_name(&name), profile))
            .collect();
        Self {
            profiles: Mutex::new(profiles),
        }
    }
}

impl KnowledgeStore for MemoryStore {
    fn load_all(&self) -> Result<KnowledgeMap> {
        Ok(self.profiles.lock().clone())
    }

    fn save_all(&self, profiles: &KnowledgeMap) -> Result<()> {
        *self.profiles.lock() = profiles.clone();
        Ok(())
    }
}
