//! Knowledge base accessor.
//!
//! Profiles live in an immutable [`Snapshot`] behind a lock. Readers clone
//! the `Arc` and work lock-free; [`KnowledgeBase::update`] builds a new map,
//! persists it, then swaps the snapshot. Writers are serialized.

pub mod store;

use std::sync::Arc;

use agropest_core::{KnowledgeMap, PestProfile, canonical_name};
use parking_lot::RwLock;
use tracing::{info, warn};

pub use store::{JsonFileStore, KnowledgeStore, MemoryStore, default_knowledge};

use crate::{Error, Result};

/// Point-in-time view of the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Bumped on every successful update
    pub revision: u64,
    /// Matchable profiles by canonical name
    pub profiles: KnowledgeMap,
    /// Stored profiles withheld from matching (no symptoms and no crops);
    /// written back unchanged on save
    pub skipped: KnowledgeMap,
}

/// Shared, read-mostly pest profile registry.
pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: tokio::sync::Mutex<()>,
}

impl KnowledgeBase {
    /// Load every profile from `store`.
    ///
    /// Keys are canonicalized; profiles with neither symptoms nor crops are
    /// withheld from matching with a warning.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read.
    pub fn load(store: Arc<dyn KnowledgeStore>) -> Result<Self> {
        let mut profiles = KnowledgeMap::new();
        let mut skipped = KnowledgeMap::new();
        for (name, profile) in store.load_all()? {
            let name = canonical_name(&name);
            if name.is_empty() {
                warn!("Skipping profile with empty name");
                continue;
            }
            if profile.is_matchable() {
                profiles.insert(name, profile);
            } else {
                warn!(pest = %name, "Skipping profile with no symptoms and no crops");
                skipped.insert(name, profile);
            }
        }
        info!(profiles = profiles.len(), skipped = skipped.len(), "Knowledge base loaded");

        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(Snapshot {
                revision: 0,
                profiles,
                skipped,
            })),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Current revision
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.snapshot.read().revision
    }

    /// Number of matchable profiles
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().profiles.len()
    }

    /// Whether there are no matchable profiles
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.snapshot.read().profiles.keys().cloned().collect()
    }

    /// Case-insensitive exact lookup
    #[must_use]
    pub fn search(&self, name: &str) -> Option<PestProfile> {
        self.snapshot.read().profiles.get(&canonical_name(name)).cloned()
    }

    /// Insert or replace a profile.
    ///
    /// The profile's `version` is set to one past the stored version (1 for
    /// new pests). The whole map is persisted before the new snapshot becomes
    /// visible, so a failed write leaves readers on the old data.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidProfile`] when the name is blank or the profile has
    /// neither symptoms nor crops; store errors when persisting fails.
    pub async fn update(&self, name: &str, mut profile: PestProfile) -> Result<PestProfile> {
        let name = canonical_name(name);
        if name.is_empty() {
            return Err(Error::InvalidProfile("pest name cannot be empty".to_string()));
        }
        if !profile.is_matchable() {
            return Err(Error::InvalidProfile(format!(
                "'{name}' needs at least one symptom or crop"
            )));
        }

        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        let previous = current
            .profiles
            .get(&name)
            .or_else(|| current.skipped.get(&name))
            .map(|p| p.version);
        profile.version = previous.map_or(1, |v| v.saturating_add(1));

        let mut profiles = current.profiles.clone();
        profiles.insert(name.clone(), profile.clone());
        let mut skipped = current.skipped.clone();
        skipped.remove(&name);

        let mut persisted = skipped.clone();
        persisted.extend(profiles.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.store.save_all(&persisted)?;

        let revision = current.revision + 1;
        *self.snapshot.write() = Arc::new(Snapshot {
            revision,
            profiles,
            skipped,
        });
        info!(pest = %name, version = profile.version, revision, "Profile updated");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    struct ReadOnlyStore(KnowledgeMap);

    impl KnowledgeStore for ReadOnlyStore {
        fn load_all(&self) -> Result<KnowledgeMap> {
            Ok(self.0.clone())
        }

        fn save_all(&self, _profiles: &KnowledgeMap) -> Result<()> {
            Err(Error::KnowledgeBase("read-only".to_string()))
        }
    }

    fn with_crops(crops: &[&str]) -> PestProfile {
        PestProfile {
            crops: crops.iter().map(|c| (*c).to_string()).collect::<BTreeSet<_>>(),
            ..PestProfile::default()
        }
    }

    fn defaults() -> KnowledgeBase {
        KnowledgeBase::load(Arc::new(MemoryStore::new(default_knowledge().unwrap()))).unwrap()
    }

    #[test]
    fn search_is_case_insensitive_exact() {
        let kb = defaults();
        assert!(kb.search("WhiteFly").is_some());
        assert!(kb.search(" spider mite ").is_some());
        assert!(kb.search("white").is_none());
    }

    #[test]
    fn unmatchable_profiles_are_withheld_at_load() {
        // GIVEN: a stored profile with only a life cycle
        let mut map = default_knowledge().unwrap();
        map.insert(
            "ghost".to_string(),
            PestProfile {
                life_cycle: "unknown".to_string(),
                ..PestProfile::default()
            },
        );

        // WHEN: loading
        let kb = KnowledgeBase::load(Arc::new(MemoryStore::new(map))).unwrap();

        // THEN: it is not matchable but is remembered
        assert!(kb.search("ghost").is_none());
        assert_eq!(kb.len(), 4);
        assert!(kb.snapshot().skipped.contains_key("ghost"));
    }

    #[tokio::test]
    async fn update_bumps_version_and_revision() {
        let kb = defaults();
        let before = kb.search("aphid").unwrap().version;

        let stored = kb.update("Aphid", with_crops(&["maize"])).await.unwrap();

        assert_eq!(stored.version, before + 1);
        assert_eq!(kb.revision(), 1);
        assert_eq!(kb.search("aphid").unwrap().crops.len(), 1);
    }

    #[tokio::test]
    async fn new_pest_starts_at_version_one() {
        let kb = defaults();
        let mut profile = with_crops(&["maize"]);
        profile.version = 42;
        let stored = kb.update("fall armyworm", profile).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(kb.names().len(), 5);
    }

    #[tokio::test]
    async fn invalid_profiles_are_rejected() {
        let kb = defaults();
        let err = kb.update("locust", PestProfile::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidProfile(_)));
        let err = kb.update("  ", with_crops(&["maize"])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidProfile(_)));
        assert_eq!(kb.revision(), 0);
    }

    #[tokio::test]
    async fn failed_persist_keeps_old_snapshot() {
        // GIVEN: a store that rejects writes
        let kb = KnowledgeBase::load(Arc::new(ReadOnlyStore(default_knowledge().unwrap()))).unwrap();

        // WHEN: updating
        let result = kb.update("aphid", with_crops(&["maize"])).await;

        // THEN: the error surfaces and readers still see the old profile
        assert!(result.is_err());
        assert_eq!(kb.revision(), 0);
        assert_eq!(kb.search("aphid").unwrap().crops.len(), 5);
    }

    #[tokio::test]
    async fn updating_skipped_profile_revives_it() {
        let mut map = default_knowledge().unwrap();
        map.insert("ghost".to_string(), PestProfile::default());
        let store = Arc::new(MemoryStore::new(map));
        let kb = KnowledgeBase::load(Arc::clone(&store) as Arc<dyn KnowledgeStore>).unwrap();

        let stored = kb.update("ghost", with_crops(&["rice"])).await.unwrap();

        assert_eq!(stored.version, 1);
        assert!(kb.search("ghost").is_some());
        assert!(!kb.snapshot().skipped.contains_key("ghost"));
        assert_eq!(store.load_all().unwrap().len(), 5);
    }
}
