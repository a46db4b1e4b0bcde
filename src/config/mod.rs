// Layered configuration system

pub mod loader;
pub mod merger;

pub use loader::{
    ActivityConfig, ConfigLoader, DraftsConfig, EngineConfig, StorageConfig, WorkflowConfig,
};
pub use merger::{
    ConfigMerger, PartialActivityConfig, PartialConfig, PartialDraftsConfig,
    PartialStorageConfig, PartialWorkflowConfig,
};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::activity::ActivityRecorder;
use crate::file_storage::{FileActivityStore, FileDraftBackend};
use crate::workflow::{DraftStore, EntryOptions};

/// Load and merge configuration from all sources
/// Priority: CLI -> Project -> Global -> Defaults
pub fn load_merged_config(
    project_path: Option<&Path>,
    cli_overrides: Option<PartialConfig>,
) -> Result<EngineConfig> {
    let loader = match project_path {
        Some(path) => ConfigLoader::new().with_project_path(path),
        None => ConfigLoader::new(),
    };
    merge_with_loader(&loader, cli_overrides)
}

/// Merge using an explicit loader
pub fn merge_with_loader(
    loader: &ConfigLoader,
    cli_overrides: Option<PartialConfig>,
) -> Result<EngineConfig> {
    let global = loader.load_global()?;
    let project = loader.load_project()?;

    Ok(ConfigMerger::new()
        .with_global(global)
        .with_project(project)
        .with_cli(cli_overrides)
        .merge())
}

impl EngineConfig {
    /// Draft store for this config.
    ///
    /// Falls back to memory-only when persistence is disabled or the data
    /// directory cannot be prepared; every write then reports itself as
    /// not persisted.
    pub fn build_draft_store(&self) -> DraftStore {
        if !self.storage.persist_drafts {
            return DraftStore::in_memory();
        }

        let data_dir = self.data_dir();
        match FileDraftBackend::new(&data_dir) {
            Ok(backend) => DraftStore::new(Arc::new(backend), self.drafts.conflict_policy),
            Err(e) => {
                log::warn!(
                    "Draft persistence unavailable at {}: {}; keeping drafts in memory",
                    data_dir.display(),
                    e
                );
                DraftStore::in_memory()
            }
        }
    }

    /// Entry options for a workflow opened without an explicit mode
    pub fn default_entry(&self) -> EntryOptions {
        EntryOptions::mode(self.workflow.default_mode)
    }

    /// File-backed activity store under the data directory
    pub fn build_activity_store(&self) -> Result<FileActivityStore> {
        let data_dir = self.data_dir();
        FileActivityStore::new(&data_dir)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Failed to open activity log in {}", data_dir.display()))
    }

    /// Recorder for one workspace, using the configured page size
    pub fn build_activity_recorder(&self, workspace_id: &str) -> Result<ActivityRecorder> {
        let store = self.build_activity_store()?;
        Ok(ActivityRecorder::new(Arc::new(store), workspace_id)
            .with_page_size(self.activity.page_size))
    }
}
