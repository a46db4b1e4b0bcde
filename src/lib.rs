// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f
#![allow(clippy::unwrap_or_default)] // unwrap_or_else(Default::default) can be clearer

// Module declarations
pub mod activity;
pub mod config;
pub mod events;
pub mod file_storage;
pub mod workflow;

pub use activity::{
    ActivityEvent, ActivityPage, ActivityQuery, ActivityRecorder, ActivityStore, ActivityType,
    EntityCategory, MemoryActivityStore,
};
pub use config::{load_merged_config, EngineConfig};
pub use events::{notification_channel, WorkflowNotification};
pub use file_storage::{FileActivityStore, FileDraftBackend};
pub use workflow::{
    DraftStore, Entry, EntryOptions, WorkflowDefinition, WorkflowError, WorkflowInstance,
    WorkflowMode, WorkflowModule, WorkflowServices,
};
