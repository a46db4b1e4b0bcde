//! Index files for append-mostly collections
//!
//! An index file wraps a list of entries with a format version and a last-updated
//! timestamp. The activity log keeps one index file per workspace.

use super::{read_json, write_json, FileResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version of the index file format
pub const INDEX_VERSION: u32 = 1;

/// Generic index file wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile<T> {
    /// File format version
    pub version: u32,
    /// When this index was last updated
    pub updated_at: DateTime<Utc>,
    /// The indexed entries, in append order
    pub entries: Vec<T>,
}

impl<T> Default for IndexFile<T> {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

/// Read an index file, returning an empty index if it doesn't exist
pub fn read_index<T: serde::de::DeserializeOwned>(index_path: &Path) -> FileResult<IndexFile<T>> {
    if !index_path.exists() {
        return Ok(IndexFile::default());
    }

    let index: IndexFile<T> = read_json(index_path)?;
    if index.version > INDEX_VERSION {
        return Err(format!(
            "Index {:?} has unsupported version {} (max {})",
            index_path, index.version, INDEX_VERSION
        ));
    }
    Ok(index)
}

/// Write an index file
pub fn write_index<T: Serialize>(index_path: &Path, entries: Vec<T>) -> FileResult<()> {
    let index = IndexFile {
        version: INDEX_VERSION,
        updated_at: Utc::now(),
        entries,
    };

    write_json(index_path, &index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
    }

    fn entry(id: &str) -> Entry {
        Entry { id: id.to_string() }
    }

    #[test]
    fn test_read_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let index: IndexFile<Entry> = read_index(&temp_dir.path().join("index.json")).unwrap();

        assert_eq!(index.version, INDEX_VERSION);
        assert!(index.entries.is_empty());
    }

    #[test]
    fn test_write_and_read_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");

        write_index(&path, vec![entry("a"), entry("b")]).unwrap();

        let index: IndexFile<Entry> = read_index(&path).unwrap();
        assert_eq!(index.entries, vec![entry("a"), entry("b")]);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("index.json");

        write_index(&path, vec![entry("first")]).unwrap();

        let index: IndexFile<Entry> = read_index(&path).unwrap();
        assert_eq!(index.entries[0].id, "first");
    }

    #[test]
    fn test_future_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "updatedAt": "2024-01-01T00:00:00Z", "entries": []}"#,
        )
        .unwrap();

        let result: FileResult<IndexFile<Entry>> = read_index(&path);
        assert!(result.unwrap_err().contains("unsupported version"));
    }
}
