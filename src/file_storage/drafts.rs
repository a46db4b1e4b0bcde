//! File-backed draft storage
//!
//! One JSON file per module key under `{data_dir}/drafts/`. Every write is a
//! compare-and-swap on the stored revision, done under an exclusive lock on a
//! sibling `{key}.lock` file so separate processes cannot interleave.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{get_drafts_dir, init_data_dir, write_json, FileResult};
use crate::workflow::draft_store::{DraftBackend, DraftStoreError};
use crate::workflow::session::WorkflowSession;

/// Version of the draft file format
pub const DRAFT_FILE_VERSION: u32 = 1;

/// Module keys become file names
const KEY_PATTERN: &str = r"^[a-z0-9][a-z0-9_-]{0,63}$";

static KEY_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// On-disk draft wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
    pub session: WorkflowSession,
}

/// Check that a module key is safe to use as a file name
pub fn validate_key(key: &str) -> Result<(), DraftStoreError> {
    let regex = KEY_REGEX
        .get_or_init(|| Regex::new(KEY_PATTERN))
        .as_ref()
        .map_err(|e| DraftStoreError::InvalidKey(e.to_string()))?;
    if regex.is_match(key) {
        Ok(())
    } else {
        Err(DraftStoreError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct FileDraftBackend {
    drafts_dir: PathBuf,
}

impl FileDraftBackend {
    /// Open (and create if needed) the drafts directory of a data directory
    pub fn new(data_dir: &Path) -> FileResult<Self> {
        init_data_dir(data_dir)?;
        Ok(Self {
            drafts_dir: get_drafts_dir(data_dir),
        })
    }

    pub fn drafts_dir(&self) -> &Path {
        &self.drafts_dir
    }

    fn draft_path(&self, key: &str) -> PathBuf {
        self.drafts_dir.join(format!("{}.json", key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.drafts_dir.join(format!("{}.lock", key))
    }

    /// Run `f` while holding the key's exclusive file lock
    fn with_lock<T>(
        &self,
        key: &str,
        f: impl FnOnce() -> Result<T, DraftStoreError>,
    ) -> Result<T, DraftStoreError> {
        let lock_file: File = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(key))
            .map_err(|e| DraftStoreError::Io(format!("Failed to open lock for {}: {}", key, e)))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| DraftStoreError::Io(format!("Failed to lock draft {}: {}", key, e)))?;

        let result = f();

        if let Err(e) = FileExt::unlock(&lock_file) {
            log::warn!("Failed to unlock draft {}: {}", key, e);
        }
        result
    }

    fn read_file(&self, key: &str) -> Result<Option<DraftFile>, DraftStoreError> {
        let path = self.draft_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| DraftStoreError::Io(format!("Failed to read {:?}: {}", path, e)))?;
        let file: DraftFile = serde_json::from_str(&content).map_err(|e| {
            DraftStoreError::Serialization(format!("Failed to parse {:?}: {}", path, e))
        })?;
        if file.version > DRAFT_FILE_VERSION {
            return Err(DraftStoreError::Serialization(format!(
                "Draft {:?} has unsupported version {}",
                path, file.version
            )));
        }
        Ok(Some(file))
    }
}

impl DraftBackend for FileDraftBackend {
    fn load(&self, key: &str) -> Result<Option<WorkflowSession>, DraftStoreError> {
        validate_key(key)?;
        Ok(self.read_file(key)?.map(|file| {
            let mut session = file.session;
            session.revision = file.revision;
            session
        }))
    }

    fn write(
        &self,
        key: &str,
        expected_revision: u64,
        session: &WorkflowSession,
    ) -> Result<u64, DraftStoreError> {
        validate_key(key)?;
        self.with_lock(key, || {
            let actual = self.read_file(key)?.map(|f| f.revision).unwrap_or(0);
            if actual != expected_revision {
                return Err(DraftStoreError::Conflict {
                    key: key.to_string(),
                    expected: expected_revision,
                    actual,
                });
            }

            let revision = actual + 1;
            let mut stored = session.clone();
            stored.revision = revision;
            let file = DraftFile {
                version: DRAFT_FILE_VERSION,
                updated_at: Utc::now(),
                revision,
                session: stored,
            };
            write_json(&self.draft_path(key), &file).map_err(DraftStoreError::Io)?;
            log::debug!("Wrote draft {} at revision {}", key, revision);
            Ok(revision)
        })
    }

    fn remove(&self, key: &str) -> Result<(), DraftStoreError> {
        validate_key(key)?;
        self.with_lock(key, || {
            let path = self.draft_path(key);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    DraftStoreError::Io(format!("Failed to remove {:?}: {}", path, e))
                })?;
            }
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, DraftStoreError> {
        if !self.drafts_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.drafts_dir).map_err(|e| {
            DraftStoreError::Io(format!("Failed to list {:?}: {}", self.drafts_dir, e))
        })?;

        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .filter(|key| validate_key(key).is_ok())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
