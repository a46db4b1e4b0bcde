// Configuration merging with priority

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::loader::{
    ActivityConfig, DraftsConfig, EngineConfig, StorageConfig, WorkflowConfig,
};
use crate::workflow::{ConflictPolicy, WorkflowMode};

/// Partial configuration for merging
/// Uses Option<T> for all fields to support partial overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialConfig {
    #[serde(default)]
    pub storage: Option<PartialStorageConfig>,
    #[serde(default)]
    pub drafts: Option<PartialDraftsConfig>,
    #[serde(default)]
    pub activity: Option<PartialActivityConfig>,
    #[serde(default)]
    pub workflow: Option<PartialWorkflowConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialStorageConfig {
    pub data_dir: Option<PathBuf>,
    pub persist_drafts: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialDraftsConfig {
    pub conflict_policy: Option<ConflictPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialActivityConfig {
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialWorkflowConfig {
    pub default_mode: Option<WorkflowMode>,
}

impl PartialConfig {
    /// Override only the data directory
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        let storage = self.storage.get_or_insert_with(Default::default);
        storage.data_dir = Some(data_dir);
        self
    }
}

/// Configuration merger
/// Priority order: CLI -> Project -> Global -> Defaults
pub struct ConfigMerger {
    defaults: EngineConfig,
    global: Option<EngineConfig>,
    project: Option<EngineConfig>,
    cli: Option<PartialConfig>,
}

impl ConfigMerger {
    pub fn new() -> Self {
        Self {
            defaults: EngineConfig::default(),
            global: None,
            project: None,
            cli: None,
        }
    }

    pub fn with_global(mut self, config: Option<EngineConfig>) -> Self {
        self.global = config;
        self
    }

    pub fn with_project(mut self, config: Option<EngineConfig>) -> Self {
        self.project = config;
        self
    }

    pub fn with_cli(mut self, config: Option<PartialConfig>) -> Self {
        self.cli = config;
        self
    }

    /// Merge all layers into the effective config
    pub fn merge(&self) -> EngineConfig {
        let mut result = self.defaults.clone();

        if let Some(ref global) = self.global {
            result = merge_full(&result, global);
        }

        // Project overrides global
        if let Some(ref project) = self.project {
            result = merge_full(&result, project);
        }

        // CLI overrides have the highest priority
        if let Some(ref cli) = self.cli {
            result = merge_partial(&result, cli);
        }

        result
    }
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_full(base: &EngineConfig, over: &EngineConfig) -> EngineConfig {
    EngineConfig {
        storage: StorageConfig {
            data_dir: over
                .storage
                .data_dir
                .clone()
                .or_else(|| base.storage.data_dir.clone()),
            persist_drafts: over.storage.persist_drafts,
        },
        drafts: over.drafts.clone(),
        activity: over.activity.clone(),
        workflow: over.workflow.clone(),
    }
}

fn merge_partial(base: &EngineConfig, partial: &PartialConfig) -> EngineConfig {
    EngineConfig {
        storage: partial
            .storage
            .as_ref()
            .map(|p| StorageConfig {
                data_dir: p.data_dir.clone().or_else(|| base.storage.data_dir.clone()),
                persist_drafts: p.persist_drafts.unwrap_or(base.storage.persist_drafts),
            })
            .unwrap_or_else(|| base.storage.clone()),
        drafts: partial
            .drafts
            .as_ref()
            .map(|p| DraftsConfig {
                conflict_policy: p.conflict_policy.unwrap_or(base.drafts.conflict_policy),
            })
            .unwrap_or_else(|| base.drafts.clone()),
        activity: partial
            .activity
            .as_ref()
            .map(|p| ActivityConfig {
                page_size: p.page_size.unwrap_or(base.activity.page_size),
            })
            .unwrap_or_else(|| base.activity.clone()),
        workflow: partial
            .workflow
            .as_ref()
            .map(|p| WorkflowConfig {
                default_mode: p.default_mode.unwrap_or(base.workflow.default_mode),
            })
            .unwrap_or_else(|| base.workflow.clone()),
    }
}
