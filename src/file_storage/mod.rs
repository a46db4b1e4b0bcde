//! File-based storage for draftflow
//!
//! Drafts and activity logs are plain JSON files under a single data directory:
//!
//! - `drafts/` - one `{module-key}.json` per in-progress workflow session
//! - `activity/` - one `{workspace-id}.json` index of activity events per workspace
//!
//! Writes go through a temp file + rename so a crash never leaves a half-written
//! draft behind.

pub mod activity;
pub mod drafts;
pub mod index;

pub use activity::FileActivityStore;
pub use drafts::FileDraftBackend;

use std::fs;
use std::path::{Path, PathBuf};

/// Common file operations result type
pub type FileResult<T> = Result<T, String>;

/// Name of the data directory inside the user's home
const DATA_DIR_NAME: &str = ".draftflow";

/// Get the default data directory (`~/.draftflow`)
pub fn get_default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Get the drafts directory under a data directory
pub fn get_drafts_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("drafts")
}

/// Get the activity directory under a data directory
pub fn get_activity_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("activity")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &str) -> FileResult<()> {
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    fs::write(&temp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e))?;

    Ok(())
}

/// Read a JSON file and deserialize it
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

/// Write data as pretty-printed JSON atomically
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> FileResult<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;

    atomic_write(path, &content)
}

/// Initialize a data directory with its subdirectories
pub fn init_data_dir(data_dir: &Path) -> FileResult<PathBuf> {
    ensure_dir(data_dir)?;
    ensure_dir(&get_drafts_dir(data_dir))?;
    ensure_dir(&get_activity_dir(data_dir))?;

    let gitignore_path = data_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, "*.lock\n*.tmp\n")
            .map_err(|e| format!("Failed to write .gitignore: {}", e))?;
    }

    Ok(data_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_dir_layout() {
        let data_dir = Path::new("/home/user/.draftflow");
        assert_eq!(
            get_drafts_dir(data_dir),
            PathBuf::from("/home/user/.draftflow/drafts")
        );
        assert_eq!(
            get_activity_dir(data_dir),
            PathBuf::from("/home/user/.draftflow/activity")
        );
    }

    #[test]
    fn test_ensure_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("c");

        assert!(!nested_path.exists());
        ensure_dir(&nested_path).unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("draft.json");

        atomic_write(&file_path, "{}").unwrap();

        assert!(file_path.exists());
        assert!(!file_path.with_extension("tmp").exists());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");
    }

    #[test]
    fn test_read_write_json() {
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        struct TestData {
            name: String,
            value: i32,
        }

        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        write_json(&file_path, &data).unwrap();
        let read_data: TestData = read_json(&file_path).unwrap();

        assert_eq!(data, read_data);
    }

    #[test]
    fn test_read_json_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result: FileResult<serde_json::Value> =
            read_json(&temp_dir.path().join("missing.json"));
        assert!(result.unwrap_err().contains("Failed to read file"));
    }

    #[test]
    fn test_init_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join(".draftflow");

        init_data_dir(&data_dir).unwrap();

        assert!(get_drafts_dir(&data_dir).exists());
        assert!(get_activity_dir(&data_dir).exists());
        let gitignore = fs::read_to_string(data_dir.join(".gitignore")).unwrap();
        assert!(gitignore.contains("*.lock"));
    }
}
