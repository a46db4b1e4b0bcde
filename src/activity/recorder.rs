//! Fire-and-forget milestone recording
//!
//! Failures are logged and swallowed; recording never blocks or fails a
//! workflow.

use std::sync::Arc;

use super::store::{ActivityPage, ActivityQuery, ActivityStore, DEFAULT_PAGE_SIZE};
use super::{ActivityEvent, ActivityMetadata, ActivityType, EntityCategory, NewActivity, META_ENTITY_ID};

#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn ActivityStore>,
    workspace_id: String,
    page_size: usize,
}

impl std::fmt::Debug for ActivityRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRecorder")
            .field("workspace_id", &self.workspace_id)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn ActivityStore>, workspace_id: &str) -> Self {
        Self {
            store,
            workspace_id: workspace_id.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Append a milestone. Returns the stored event, or `None` if the append
    /// failed (already logged).
    pub fn record(
        &self,
        event_type: ActivityType,
        title: &str,
        description: &str,
        metadata: ActivityMetadata,
    ) -> Option<ActivityEvent> {
        let mut activity =
            NewActivity::new(&self.workspace_id, event_type, title).with_description(description);
        activity.metadata = metadata;
        self.append(activity)
    }

    /// Record that a business entity was archived
    pub fn record_archived(
        &self,
        category: EntityCategory,
        entity_id: &str,
        title: &str,
    ) -> Option<ActivityEvent> {
        self.append(
            NewActivity::new(&self.workspace_id, ActivityType::EntityArchived, title)
                .with_entity_category(category)
                .with_metadata(META_ENTITY_ID, entity_id),
        )
    }

    /// Record that an archived entity was restored
    pub fn record_reopened(
        &self,
        category: EntityCategory,
        entity_id: &str,
        title: &str,
    ) -> Option<ActivityEvent> {
        self.append(
            NewActivity::new(&self.workspace_id, ActivityType::EntityReopened, title)
                .with_entity_category(category)
                .with_metadata(META_ENTITY_ID, entity_id),
        )
    }

    fn append(&self, activity: NewActivity) -> Option<ActivityEvent> {
        let event_type = activity.event_type;
        match self.store.append(activity) {
            Ok(event) => {
                log::debug!(
                    "Recorded {} in workspace {}",
                    event.event_type,
                    event.workspace_id
                );
                Some(event)
            }
            Err(e) => {
                log::error!(
                    "Failed to record {} in workspace {}: {}",
                    event_type,
                    self.workspace_id,
                    e
                );
                None
            }
        }
    }

    /// Query this workspace's feed with the configured page size.
    /// The query's workspace is forced to this recorder's.
    pub fn feed(&self, query: ActivityQuery) -> Option<ActivityPage> {
        let mut query = query;
        query.workspace_id = self.workspace_id.clone();
        match self.store.query(&query, self.page_size) {
            Ok(page) => Some(page),
            Err(e) => {
                log::error!("Failed to query activity for {}: {}", self.workspace_id, e);
                None
            }
        }
    }
}
