//! Activity feed
//!
//! An append-only log of workflow milestones per workspace. Events are never
//! mutated or deleted; archiving an entity is itself a new event.

pub mod recorder;
pub mod store;

pub use recorder::ActivityRecorder;
pub use store::{
    ActivityError, ActivityPage, ActivityQuery, ActivityStore, MemoryActivityStore,
    DEFAULT_PAGE_SIZE,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key linking an event to a client
pub const META_CLIENT_ID: &str = "clientId";
/// Metadata key linking an event to the workflow instance that produced it
pub const META_WORKFLOW_INSTANCE_ID: &str = "workflowInstanceId";
/// Metadata key for the created record's identifier
pub const META_RECORD_ID: &str = "recordId";
pub const META_MODULE_KEY: &str = "moduleKey";
pub const META_ENTITY_ID: &str = "entityId";

pub type ActivityMetadata = BTreeMap<String, serde_json::Value>;

/// Closed vocabulary of milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    ClientCreated,
    BriefingCompleted,
    PlanCreated,
    DiagnosisCreated,
    IaDiagnosisGenerated,
    ProposalCreated,
    ProposalGenerated,
    ContractCreated,
    LaunchKitCreated,
    TaskCompleted,
    EntityArchived,
    EntityReopened,
}

impl ActivityType {
    pub fn all() -> &'static [ActivityType] {
        &[
            ActivityType::ClientCreated,
            ActivityType::BriefingCompleted,
            ActivityType::PlanCreated,
            ActivityType::DiagnosisCreated,
            ActivityType::IaDiagnosisGenerated,
            ActivityType::ProposalCreated,
            ActivityType::ProposalGenerated,
            ActivityType::ContractCreated,
            ActivityType::LaunchKitCreated,
            ActivityType::TaskCompleted,
            ActivityType::EntityArchived,
            ActivityType::EntityReopened,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::ClientCreated => "CLIENT_CREATED",
            ActivityType::BriefingCompleted => "BRIEFING_COMPLETED",
            ActivityType::PlanCreated => "PLAN_CREATED",
            ActivityType::DiagnosisCreated => "DIAGNOSIS_CREATED",
            ActivityType::IaDiagnosisGenerated => "IA_DIAGNOSIS_GENERATED",
            ActivityType::ProposalCreated => "PROPOSAL_CREATED",
            ActivityType::ProposalGenerated => "PROPOSAL_GENERATED",
            ActivityType::ContractCreated => "CONTRACT_CREATED",
            ActivityType::LaunchKitCreated => "LAUNCH_KIT_CREATED",
            ActivityType::TaskCompleted => "TASK_COMPLETED",
            ActivityType::EntityArchived => "ENTITY_ARCHIVED",
            ActivityType::EntityReopened => "ENTITY_REOPENED",
        }
    }

    /// Entity category used by feed filters.
    ///
    /// Archive and reopen events carry no fixed category; theirs comes from
    /// the referenced entity (see [`ActivityEvent::category`]).
    pub fn category(&self) -> Option<EntityCategory> {
        match self {
            ActivityType::ClientCreated => Some(EntityCategory::Client),
            ActivityType::BriefingCompleted | ActivityType::PlanCreated => {
                Some(EntityCategory::Plan)
            }
            ActivityType::DiagnosisCreated | ActivityType::IaDiagnosisGenerated => {
                Some(EntityCategory::Diagnosis)
            }
            ActivityType::ProposalCreated | ActivityType::ProposalGenerated => {
                Some(EntityCategory::Proposal)
            }
            ActivityType::ContractCreated => Some(EntityCategory::Contract),
            ActivityType::LaunchKitCreated => Some(EntityCategory::LaunchKit),
            ActivityType::TaskCompleted => Some(EntityCategory::Task),
            ActivityType::EntityArchived | ActivityType::EntityReopened => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of business entity an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Client,
    Plan,
    Diagnosis,
    Proposal,
    Contract,
    LaunchKit,
    Task,
}

impl EntityCategory {
    pub fn all() -> &'static [EntityCategory] {
        &[
            EntityCategory::Client,
            EntityCategory::Plan,
            EntityCategory::Diagnosis,
            EntityCategory::Proposal,
            EntityCategory::Contract,
            EntityCategory::LaunchKit,
            EntityCategory::Task,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Client => "client",
            EntityCategory::Plan => "plan",
            EntityCategory::Diagnosis => "diagnosis",
            EntityCategory::Proposal => "proposal",
            EntityCategory::Contract => "contract",
            EntityCategory::LaunchKit => "launch_kit",
            EntityCategory::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub workspace_id: String,
    #[serde(rename = "type")]
    pub event_type: ActivityType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub metadata: ActivityMetadata,
    /// Archive/reopen events name the category of the entity they touch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,
    pub created_at: DateTime<Utc>,
    /// Append position within the workspace; the feed orders by it
    #[serde(default)]
    pub sequence: u64,
}

impl ActivityEvent {
    pub fn category(&self) -> Option<EntityCategory> {
        self.event_type.category().or(self.entity_category)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.metadata.get(META_CLIENT_ID).and_then(|v| v.as_str())
    }

    pub fn workflow_instance_id(&self) -> Option<&str> {
        self.metadata
            .get(META_WORKFLOW_INSTANCE_ID)
            .and_then(|v| v.as_str())
    }
}

/// Input for appending an event; the store assigns id, time and sequence
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub workspace_id: String,
    pub event_type: ActivityType,
    pub title: String,
    pub description: String,
    pub metadata: ActivityMetadata,
    pub entity_category: Option<EntityCategory>,
}

impl NewActivity {
    pub fn new(workspace_id: &str, event_type: ActivityType, title: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            event_type,
            title: title.to_string(),
            description: String::new(),
            metadata: ActivityMetadata::new(),
            entity_category: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_entity_category(mut self, category: EntityCategory) -> Self {
        self.entity_category = Some(category);
        self
    }

    /// Stamp into a stored event
    pub(crate) fn into_event(self, sequence: u64) -> ActivityEvent {
        ActivityEvent {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: self.workspace_id,
            event_type: self.event_type,
            title: self.title,
            description: self.description,
            metadata: self.metadata,
            entity_category: self.entity_category,
            created_at: Utc::now(),
            sequence,
        }
    }
}
