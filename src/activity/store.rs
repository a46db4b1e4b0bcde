//! Activity storage and feed queries

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

use super::{ActivityEvent, EntityCategory, NewActivity};
use crate::workflow::draft_store::lock;

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("Activity storage error: {0}")]
    Storage(String),

    #[error("Invalid workspace id: {0}")]
    InvalidWorkspace(String),
}

/// Feed filter. All filters are optional except the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub workspace_id: String,
    #[serde(default)]
    pub category: Option<EntityCategory>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub workflow_instance_id: Option<String>,
    /// 1-indexed
    #[serde(default = "first_page")]
    pub page: usize,
}

fn first_page() -> usize {
    1
}

impl ActivityQuery {
    pub fn workspace(workspace_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            category: None,
            client_id: None,
            workflow_instance_id: None,
            page: 1,
        }
    }

    pub fn category(mut self, category: EntityCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn workflow_instance(mut self, instance_id: &str) -> Self {
        self.workflow_instance_id = Some(instance_id.to_string());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn matches(&self, event: &ActivityEvent) -> bool {
        if event.workspace_id != self.workspace_id {
            return false;
        }
        if let Some(category) = self.category {
            if event.category() != Some(category) {
                return false;
            }
        }
        if let Some(client_id) = &self.client_id {
            if event.client_id() != Some(client_id.as_str()) {
                return false;
            }
        }
        if let Some(instance_id) = &self.workflow_instance_id {
            if event.workflow_instance_id() != Some(instance_id.as_str()) {
                return false;
            }
        }
        true
    }

    /// Filter, sort newest appended first and cut out the requested page
    pub fn paginate<I>(&self, events: I, page_size: usize) -> ActivityPage
    where
        I: IntoIterator<Item = ActivityEvent>,
    {
        let page_size = page_size.max(1);
        let page = self.page.max(1);

        let mut matching: Vec<ActivityEvent> =
            events.into_iter().filter(|e| self.matches(e)).collect();
        // Append order decides; wall clocks can step backwards
        matching.sort_by(|a, b| {
            b.sequence
                .cmp(&a.sequence)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let total = matching.len();
        let start = (page - 1).saturating_mul(page_size);
        let events: Vec<ActivityEvent> =
            matching.into_iter().skip(start).take(page_size).collect();

        ActivityPage {
            has_more: start + events.len() < total,
            events,
            page,
            page_size,
            total,
        }
    }
}

/// One page of the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub events: Vec<ActivityEvent>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

/// Append-only event storage
pub trait ActivityStore: Send + Sync {
    /// Append an event and return it as stored
    fn append(&self, activity: NewActivity) -> Result<ActivityEvent, ActivityError>;

    /// Query one page of a workspace's events, newest first
    fn query(&self, query: &ActivityQuery, page_size: usize)
        -> Result<ActivityPage, ActivityError>;
}

/// In-process activity store
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityStore for MemoryActivityStore {
    fn append(&self, activity: NewActivity) -> Result<ActivityEvent, ActivityError> {
        if activity.workspace_id.trim().is_empty() {
            return Err(ActivityError::InvalidWorkspace(activity.workspace_id));
        }
        let mut events = lock(&self.events);
        let sequence = events
            .iter()
            .filter(|e| e.workspace_id == activity.workspace_id)
            .count() as u64;
        let event = activity.into_event(sequence);
        events.push(event.clone());
        Ok(event)
    }

    fn query(
        &self,
        query: &ActivityQuery,
        page_size: usize,
    ) -> Result<ActivityPage, ActivityError> {
        let events = lock(&self.events).clone();
        Ok(query.paginate(events, page_size))
    }
}
