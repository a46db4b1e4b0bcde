// Notification names and payloads for user-facing workflow updates
// These are pushed to whatever UI layer listens on the notification channel

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::workflow::WorkflowMode;

// Notification name constants
pub const EVENT_STEP_CHANGED: &str = "workflow:step_changed";
pub const EVENT_MODE_CHANGED: &str = "workflow:mode_changed";
pub const EVENT_WORKFLOW_COMPLETED: &str = "workflow:completed";
pub const EVENT_PERSISTENCE_DEGRADED: &str = "draft:persistence_degraded";

// Collaborator outcomes (transient, retryable)
pub const EVENT_GENERATION_COMPLETED: &str = "generation:completed";
pub const EVENT_GENERATION_FAILED: &str = "generation:failed";
pub const EVENT_RECORD_CREATION_FAILED: &str = "record:creation_failed";

/// Payload for step change notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChangedPayload {
    pub module_key: String,
    pub from_step: usize,
    pub to_step: usize,
    pub step_count: usize,
}

/// Payload for mode change notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeChangedPayload {
    pub module_key: String,
    pub old_mode: WorkflowMode,
    pub new_mode: WorkflowMode,
    pub current_step: usize,
}

/// Payload for degraded draft persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceDegradedPayload {
    pub module_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCompletedPayload {
    pub module_key: String,
    /// Extras key the content was written under
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFailedPayload {
    pub module_key: String,
    pub target: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCreationFailedPayload {
    pub module_key: String,
    pub workflow_instance_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCompletedPayload {
    pub module_key: String,
    pub workflow_instance_id: String,
    pub record_id: String,
}

/// A notification sent to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum WorkflowNotification {
    #[serde(rename = "workflow:step_changed")]
    StepChanged(StepChangedPayload),
    #[serde(rename = "workflow:mode_changed")]
    ModeChanged(ModeChangedPayload),
    #[serde(rename = "workflow:completed")]
    Completed(WorkflowCompletedPayload),
    #[serde(rename = "draft:persistence_degraded")]
    PersistenceDegraded(PersistenceDegradedPayload),
    #[serde(rename = "generation:completed")]
    GenerationCompleted(GenerationCompletedPayload),
    #[serde(rename = "generation:failed")]
    GenerationFailed(GenerationFailedPayload),
    #[serde(rename = "record:creation_failed")]
    RecordCreationFailed(RecordCreationFailedPayload),
}

impl WorkflowNotification {
    pub fn event_name(&self) -> &'static str {
        match self {
            WorkflowNotification::StepChanged(_) => EVENT_STEP_CHANGED,
            WorkflowNotification::ModeChanged(_) => EVENT_MODE_CHANGED,
            WorkflowNotification::Completed(_) => EVENT_WORKFLOW_COMPLETED,
            WorkflowNotification::PersistenceDegraded(_) => EVENT_PERSISTENCE_DEGRADED,
            WorkflowNotification::GenerationCompleted(_) => EVENT_GENERATION_COMPLETED,
            WorkflowNotification::GenerationFailed(_) => EVENT_GENERATION_FAILED,
            WorkflowNotification::RecordCreationFailed(_) => EVENT_RECORD_CREATION_FAILED,
        }
    }
}

pub type NotificationSender = mpsc::UnboundedSender<WorkflowNotification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<WorkflowNotification>;

/// Create a notification channel
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Send a notification if anyone listens. A closed channel is ignored.
pub fn notify(sender: Option<&NotificationSender>, notification: WorkflowNotification) {
    let Some(sender) = sender else {
        return;
    };
    let name = notification.event_name();
    if sender.send(notification).is_err() {
        log::debug!("Dropped {} notification: receiver closed", name);
    }
}
