//! File-backed activity log
//!
//! Each workspace gets one index file, `{data_dir}/activity/{workspace}.json`,
//! appended to under an exclusive lock.

use fs2::FileExt;
use regex::Regex;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::index::{read_index, write_index, IndexFile};
use super::{ensure_dir, get_activity_dir, init_data_dir, FileResult};
use crate::activity::{
    ActivityError, ActivityEvent, ActivityPage, ActivityQuery, ActivityStore, NewActivity,
};

const WORKSPACE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$";

static WORKSPACE_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn validate_workspace(workspace_id: &str) -> Result<(), ActivityError> {
    let regex = WORKSPACE_REGEX
        .get_or_init(|| Regex::new(WORKSPACE_PATTERN))
        .as_ref()
        .map_err(|e| ActivityError::Storage(e.to_string()))?;
    if regex.is_match(workspace_id) {
        Ok(())
    } else {
        Err(ActivityError::InvalidWorkspace(workspace_id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct FileActivityStore {
    activity_dir: PathBuf,
}

impl FileActivityStore {
    pub fn new(data_dir: &Path) -> FileResult<Self> {
        init_data_dir(data_dir)?;
        Ok(Self {
            activity_dir: get_activity_dir(data_dir),
        })
    }

    fn index_path(&self, workspace_id: &str) -> PathBuf {
        self.activity_dir.join(format!("{}.json", workspace_id))
    }

    fn append_locked(&self, activity: NewActivity) -> FileResult<ActivityEvent> {
        ensure_dir(&self.activity_dir)?;
        let lock_path = self
            .activity_dir
            .join(format!("{}.lock", activity.workspace_id));
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| format!("Failed to open lock {:?}: {}", lock_path, e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| format!("Failed to lock {:?}: {}", lock_path, e))?;

        let index_path = self.index_path(&activity.workspace_id);
        let result = read_index::<ActivityEvent>(&index_path).and_then(|index| {
            let mut entries = index.entries;
            let event = activity.into_event(entries.len() as u64);
            entries.push(event.clone());
            write_index(&index_path, entries)?;
            Ok(event)
        });

        if let Err(e) = FileExt::unlock(&lock_file) {
            log::warn!("Failed to unlock {:?}: {}", lock_path, e);
        }
        result
    }
}

impl ActivityStore for FileActivityStore {
    fn append(&self, activity: NewActivity) -> Result<ActivityEvent, ActivityError> {
        validate_workspace(&activity.workspace_id)?;
        self.append_locked(activity).map_err(ActivityError::Storage)
    }

    fn query(
        &self,
        query: &ActivityQuery,
        page_size: usize,
    ) -> Result<ActivityPage, ActivityError> {
        validate_workspace(&query.workspace_id)?;
        let index: IndexFile<ActivityEvent> =
            read_index(&self.index_path(&query.workspace_id)).map_err(ActivityError::Storage)?;
        Ok(query.paginate(index.entries, page_size))
    }
}
