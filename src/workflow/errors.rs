use thiserror::Error;

use super::definition::WorkflowMode;

/// Errors surfaced by the workflow engine
///
/// `ValidationFailed` is user-fixable and names the blocking fields. The
/// collaborator variants are retryable; none of them leave the session changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Step {step} is incomplete: {}", .failed_fields.join(", "))]
    ValidationFailed {
        step: usize,
        failed_fields: Vec<String>,
    },

    #[error("Draft '{module_key}' is only kept in memory: {reason}")]
    PersistenceDegraded { module_key: String, reason: String },

    #[error("Content generation failed: {0}")]
    GenerationFailed(String),

    #[error("Record creation failed: {0}")]
    RecordCreationFailed(String),

    #[error("Workflow '{module_key}' has no {mode} track")]
    UnsupportedMode {
        module_key: String,
        mode: WorkflowMode,
    },

    #[error("Workflow track has no steps")]
    EmptyTrack,

    #[error("Cannot finalize from step {current}; the terminal step is {terminal}")]
    NotAtTerminalStep { current: usize, terminal: usize },

    #[error("Workflow '{0}' has already been finalized")]
    AlreadyFinalized(String),

    #[error("Unknown workflow module: {0}")]
    UnknownModule(String),
}

impl WorkflowError {
    /// Whether the user can retry the same action without changing anything
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::GenerationFailed(_) | WorkflowError::RecordCreationFailed(_)
        )
    }
}
