//! Draft persistence
//!
//! `DraftStore` keeps the in-progress session of every workflow module, keyed by
//! module key. Writes are synchronous and never fail from the caller's point of
//! view: the in-memory copy is always updated, and a backend failure only marks
//! the key as degraded until the next successful write.
//!
//! Backends sit behind a versioned-write interface. The store passes the revision
//! it last observed; what happens on a mismatch is decided by [`ConflictPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::definition::WorkflowMode;
use super::session::{ExtrasMap, FieldMap, WorkflowSession};

/// Errors reported by a draft backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftStoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Revision conflict on '{key}': expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid module key: {0}")]
    InvalidKey(String),
}

/// Durable key-value storage for drafts
pub trait DraftBackend: Send + Sync {
    /// Load the stored session for a key
    fn load(&self, key: &str) -> Result<Option<WorkflowSession>, DraftStoreError>;

    /// Store a session if the stored revision still equals `expected_revision`
    /// (0 when absent). Returns the new revision.
    fn write(
        &self,
        key: &str,
        expected_revision: u64,
        session: &WorkflowSession,
    ) -> Result<u64, DraftStoreError>;

    /// Remove the stored session; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<(), DraftStoreError>;

    /// Keys with a stored session
    fn keys(&self) -> Result<Vec<String>, DraftStoreError>;
}

/// What to do when another writer changed the draft since we last saw it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite with our version
    #[default]
    LastWriteWins,
    /// Keep our version in memory only
    Reject,
}

/// Outcome of a draft write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftWrite {
    Persisted { revision: u64 },
    /// No backend configured
    MemoryOnly,
    /// Backend write failed; kept in memory
    Degraded { reason: String },
}

impl DraftWrite {
    pub fn is_degraded(&self) -> bool {
        matches!(self, DraftWrite::Degraded { .. })
    }
}

/// Backend keeping drafts in process memory. Also the test double for
/// restart scenarios: share one instance between two stores.
#[derive(Debug, Default)]
pub struct MemoryDraftBackend {
    drafts: Mutex<HashMap<String, WorkflowSession>>,
}

impl MemoryDraftBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftBackend for MemoryDraftBackend {
    fn load(&self, key: &str) -> Result<Option<WorkflowSession>, DraftStoreError> {
        Ok(lock(&self.drafts).get(key).cloned())
    }

    fn write(
        &self,
        key: &str,
        expected_revision: u64,
        session: &WorkflowSession,
    ) -> Result<u64, DraftStoreError> {
        let mut drafts = lock(&self.drafts);
        let actual = drafts.get(key).map(|s| s.revision).unwrap_or(0);
        if actual != expected_revision {
            return Err(DraftStoreError::Conflict {
                key: key.to_string(),
                expected: expected_revision,
                actual,
            });
        }

        let mut stored = session.clone();
        stored.revision = actual + 1;
        drafts.insert(key.to_string(), stored);
        Ok(actual + 1)
    }

    fn remove(&self, key: &str) -> Result<(), DraftStoreError> {
        lock(&self.drafts).remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, DraftStoreError> {
        let mut keys: Vec<String> = lock(&self.drafts).keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key-scoped store of in-progress workflow sessions
pub struct DraftStore {
    backend: Option<Arc<dyn DraftBackend>>,
    policy: ConflictPolicy,
    cache: Mutex<HashMap<String, WorkflowSession>>,
    degraded: Mutex<HashSet<String>>,
    /// Times each key was cleared; guarded writes compare against it
    clear_epochs: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("persistent", &self.backend.is_some())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DraftStore {
    pub fn new(backend: Arc<dyn DraftBackend>, policy: ConflictPolicy) -> Self {
        Self {
            backend: Some(backend),
            policy,
            cache: Mutex::new(HashMap::new()),
            degraded: Mutex::new(HashSet::new()),
            clear_epochs: Mutex::new(HashMap::new()),
        }
    }

    /// Store without durable persistence
    pub fn in_memory() -> Self {
        Self {
            backend: None,
            policy: ConflictPolicy::default(),
            cache: Mutex::new(HashMap::new()),
            degraded: Mutex::new(HashSet::new()),
            clear_epochs: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Current session for a key, loading it from the backend on first access
    pub fn get(&self, key: &str) -> Option<WorkflowSession> {
        let mut cache = lock(&self.cache);
        self.load_into(&mut cache, key).cloned()
    }

    /// Shallow-merge field values, creating the session if needed
    pub fn set_fields(&self, key: &str, partial: FieldMap) -> DraftWrite {
        self.update(key, |session| session.merge_fields(partial))
    }

    /// Shallow-merge extras, creating the session if needed
    pub fn set_extras(&self, key: &str, partial: ExtrasMap) -> DraftWrite {
        self.update(key, |session| session.merge_extras(partial))
    }

    /// Store the current step. The step is floored at 1 but not capped: the
    /// store does not know the track, so callers pass a position already
    /// clamped to it. Out-of-range steps are clamped again on resume.
    pub fn set_step(&self, key: &str, step: usize) -> DraftWrite {
        self.update(key, |session| {
            session.current_step = step.max(1);
            session.touch();
        })
    }

    /// Set mode and position together; they must change atomically.
    /// Same clamping contract as [`DraftStore::set_step`].
    pub fn set_position(&self, key: &str, mode: WorkflowMode, step: usize) -> DraftWrite {
        self.update(key, |session| {
            session.mode = mode;
            session.current_step = step.max(1);
            session.touch();
        })
    }

    /// Remove named extras, leaving fields alone. A missing session is left absent.
    pub fn clear_extras(&self, key: &str, names: &[&str]) -> Option<DraftWrite> {
        if self.get(key).is_none() {
            return None;
        }
        Some(self.update(key, |session| session.remove_extras(names)))
    }

    /// Replace the whole session for a key
    pub fn save(&self, session: &WorkflowSession) -> DraftWrite {
        let incoming = session.clone();
        self.update(&session.module_key, move |current| {
            let revision = current.revision;
            *current = incoming;
            current.revision = revision;
            current.touch();
        })
    }

    /// Number of times `key` has been cleared by this store
    pub fn clear_epoch(&self, key: &str) -> u64 {
        lock(&self.clear_epochs).get(key).copied().unwrap_or(0)
    }

    /// Merge extras only if `key` was not cleared since `epoch`.
    ///
    /// An absent session is recreated from `snapshot`. Returns `None` when the
    /// write was dropped because the draft was cleared in the meantime.
    pub fn set_extras_since(
        &self,
        epoch: u64,
        snapshot: &WorkflowSession,
        partial: ExtrasMap,
    ) -> Option<DraftWrite> {
        let key = snapshot.module_key.as_str();
        let mut cache = lock(&self.cache);
        if self.clear_epoch(key) != epoch {
            log::info!("Draft '{}' was cleared; dropping late extras", key);
            return None;
        }

        if self.load_into(&mut cache, key).is_none() {
            let mut session = snapshot.clone();
            session.revision = 0;
            cache.insert(key.to_string(), session);
        }
        let session = cache.get_mut(key)?;
        session.merge_extras(partial);
        Some(self.persist(key, session))
    }

    /// Remove the entire session for a key
    pub fn clear(&self, key: &str) -> DraftWrite {
        let mut cache = lock(&self.cache);
        cache.remove(key);
        *lock(&self.clear_epochs).entry(key.to_string()).or_insert(0) += 1;

        let Some(backend) = &self.backend else {
            return DraftWrite::MemoryOnly;
        };
        match backend.remove(key) {
            Ok(()) => {
                lock(&self.degraded).remove(key);
                log::debug!("Cleared draft '{}'", key);
                DraftWrite::Persisted { revision: 0 }
            }
            Err(e) => self.degrade(key, e.to_string()),
        }
    }

    /// Whether the last write for this key failed to persist
    pub fn is_degraded(&self, key: &str) -> bool {
        lock(&self.degraded).contains(key)
    }

    /// Keys with a session, persisted or in memory
    pub fn keys(&self) -> Vec<String> {
        let mut keys: HashSet<String> = lock(&self.cache).keys().cloned().collect();
        if let Some(backend) = &self.backend {
            match backend.keys() {
                Ok(stored) => keys.extend(stored),
                Err(e) => log::warn!("Failed to list stored drafts: {}", e),
            }
        }
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    fn load_into<'a>(
        &self,
        cache: &'a mut HashMap<String, WorkflowSession>,
        key: &str,
    ) -> Option<&'a mut WorkflowSession> {
        if !cache.contains_key(key) {
            let backend = self.backend.as_ref()?;
            match backend.load(key) {
                Ok(Some(session)) => {
                    cache.insert(key.to_string(), session);
                }
                Ok(None) => return None,
                Err(e) => {
                    log::warn!("Failed to load draft '{}': {}", key, e);
                    return None;
                }
            }
        }
        cache.get_mut(key)
    }

    fn update<F>(&self, key: &str, apply: F) -> DraftWrite
    where
        F: FnOnce(&mut WorkflowSession),
    {
        let mut cache = lock(&self.cache);
        if self.load_into(&mut cache, key).is_none() {
            cache.insert(
                key.to_string(),
                WorkflowSession::new(key, WorkflowMode::default()),
            );
        }
        let Some(session) = cache.get_mut(key) else {
            return DraftWrite::MemoryOnly;
        };
        apply(session);
        self.persist(key, session)
    }

    fn persist(&self, key: &str, session: &mut WorkflowSession) -> DraftWrite {
        let Some(backend) = &self.backend else {
            return DraftWrite::MemoryOnly;
        };

        let result = match backend.write(key, session.revision, session) {
            Err(DraftStoreError::Conflict {
                expected, actual, ..
            }) => match self.policy {
                ConflictPolicy::LastWriteWins => {
                    log::warn!(
                        "Draft '{}' changed elsewhere (revision {} != {}), overwriting",
                        key,
                        actual,
                        expected
                    );
                    backend.write(key, actual, session)
                }
                ConflictPolicy::Reject => {
                    log::warn!(
                        "Draft '{}' changed elsewhere (revision {} != {}), keeping local copy in memory",
                        key,
                        actual,
                        expected
                    );
                    Err(DraftStoreError::Conflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    })
                }
            },
            other => other,
        };

        match result {
            Ok(revision) => {
                session.revision = revision;
                lock(&self.degraded).remove(key);
                DraftWrite::Persisted { revision }
            }
            Err(e) => self.degrade(key, e.to_string()),
        }
    }

    fn degrade(&self, key: &str, reason: String) -> DraftWrite {
        log::warn!("Draft '{}' persistence degraded: {}", key, reason);
        lock(&self.degraded).insert(key.to_string());
        DraftWrite::Degraded { reason }
    }
}
