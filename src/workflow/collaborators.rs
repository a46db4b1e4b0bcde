//! External collaborators
//!
//! Content generation and record creation live outside the engine. Both are
//! asynchronous; everything else in the engine is synchronous.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::definition::WorkflowMode;
use super::session::{ExtrasMap, FieldMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service returned an error: {0}")]
    ErrorPayload(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Input for one content-generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub module_key: String,
    /// Extras key the result is written under
    pub target: String,
    /// Subset of the session's fields sent as structured input
    pub input: FieldMap,
}

/// What a generator returns
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedContent {
    Text(String),
    Structured(serde_json::Value),
}

impl GeneratedContent {
    /// Convert into the value stored in extras.
    ///
    /// A structured object carrying an `error` key is an error payload, not
    /// content. Empty text is treated as a failed generation too.
    pub fn into_extra(self) -> Result<serde_json::Value, CollaboratorError> {
        match self {
            GeneratedContent::Text(text) => {
                if text.trim().is_empty() {
                    Err(CollaboratorError::InvalidResponse(
                        "empty text response".to_string(),
                    ))
                } else {
                    Ok(serde_json::Value::String(text))
                }
            }
            GeneratedContent::Structured(value) => {
                if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
                    let message = error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    return Err(CollaboratorError::ErrorPayload(message));
                }
                Ok(value)
            }
        }
    }
}

/// Produces text or structured content from field input
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError>;
}

/// Everything handed to the record store at finalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub module_key: String,
    pub workflow_instance_id: String,
    pub workspace_id: Option<String>,
    pub mode: WorkflowMode,
    pub fields: FieldMap,
    pub extras: ExtrasMap,
}

/// Creates the business record a finished workflow produces
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the new record's identifier
    async fn create_record(&self, draft: RecordDraft) -> Result<String, CollaboratorError>;
}
