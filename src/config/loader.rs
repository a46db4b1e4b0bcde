// Configuration file loading

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::activity::store::DEFAULT_PAGE_SIZE;
use crate::file_storage::get_default_data_dir;
use crate::workflow::{ConflictPolicy, WorkflowMode};

/// Name of the per-user and per-project config directory
pub const CONFIG_DIR_NAME: &str = ".draftflow";
/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Engine configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Where drafts and activity live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Draft write behavior
    #[serde(default)]
    pub drafts: DraftsConfig,
    /// Activity feed settings
    #[serde(default)]
    pub activity: ActivityConfig,
    /// Workflow defaults
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; `~/.draftflow` when unset
    #[serde(rename = "dataDir", alias = "data_dir", default)]
    pub data_dir: Option<PathBuf>,
    /// Persist drafts to disk. When false drafts only live in memory.
    #[serde(rename = "persistDrafts", alias = "persist_drafts", default = "default_true")]
    pub persist_drafts: bool,
}

fn default_true() -> bool { true }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            persist_drafts: default_true(),
        }
    }
}

/// Draft configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftsConfig {
    /// What to do when a draft was changed by someone else since we read it
    #[serde(rename = "conflictPolicy", alias = "conflict_policy", default)]
    pub conflict_policy: ConflictPolicy,
}

/// Activity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Fixed page size for feed queries
    #[serde(rename = "pageSize", alias = "page_size", default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Workflow configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Mode used when entering a workflow without an explicit one
    #[serde(rename = "defaultMode", alias = "default_mode", default)]
    pub default_mode: WorkflowMode,
}

impl EngineConfig {
    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(get_default_data_dir)
    }
}

/// Configuration loader
pub struct ConfigLoader {
    global_path: Option<PathBuf>,
    project_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            global_path: Self::get_global_config_path(),
            project_path: None,
        }
    }

    /// Set the project directory
    pub fn with_project_path(mut self, path: &Path) -> Self {
        self.project_path = Some(path.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        self
    }

    /// Override the global config file, mostly for tests
    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    fn get_global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load global config
    pub fn load_global(&self) -> Result<Option<EngineConfig>> {
        match self.global_path {
            Some(ref path) => self.load_from_path(path),
            None => Ok(None),
        }
    }

    /// Load project config
    pub fn load_project(&self) -> Result<Option<EngineConfig>> {
        match self.project_path {
            Some(ref path) => self.load_from_path(path),
            None => Ok(None),
        }
    }

    /// Load config from a specific path. A missing file is not an error.
    pub fn load_from_path(&self, path: &Path) -> Result<Option<EngineConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;

        validate_config(&config)?;
        log::debug!("Loaded config from {}", path.display());

        Ok(Some(config))
    }

    pub fn global_config_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// Save config to a specific path
    pub fn save_to_path(&self, path: &Path, config: &EngineConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory '{}'", parent.display())
            })?;
        }

        validate_config(config)?;

        let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;

        log::info!("Saved config to: {}", path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config values
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.activity.page_size == 0 {
        return Err(anyhow!("activity.pageSize must be greater than 0"));
    }
    Ok(())
}
