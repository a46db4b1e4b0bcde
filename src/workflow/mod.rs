//! Multi-step guided workflow engine
//!
//! A workflow walks a user through an ordered list of data-collection steps:
//!
//! - [`DraftStore`] persists the in-progress session per module key so it can be
//!   abandoned and resumed.
//! - [`StepSequencer`] holds the active track and position.
//! - [`ValidationGate`] blocks advancing past a step whose requirements are unmet.
//! - [`ModeRouter`] swaps tracks when the mode changes and recomputes the
//!   position, skipping steps already satisfied by upstream data.
//! - [`ResumptionController`] offers to resume a saved draft on entry.
//!
//! [`WorkflowInstance`] wires these together with the external collaborators
//! (content generation, record creation) and the activity feed.

pub mod collaborators;
pub mod definition;
pub mod draft_store;
pub mod errors;
pub mod instance;
pub mod mode;
pub mod modules;
pub mod resumption;
pub mod sequencer;
pub mod session;
pub mod validation;

#[cfg(test)]
mod tests;

pub use collaborators::{
    CollaboratorError, ContentGenerator, GeneratedContent, GenerationRequest, RecordDraft,
    RecordStore,
};
pub use definition::{StepDefinition, WorkflowDefinition, WorkflowMode};
pub use draft_store::{
    ConflictPolicy, DraftBackend, DraftStore, DraftStoreError, DraftWrite, MemoryDraftBackend,
};
pub use errors::WorkflowError;
pub use instance::{
    Entry, EntryOptions, GenerationJob, PendingEntry, SeedData, WorkflowInstance,
    WorkflowServices,
};
pub use mode::ModeRouter;
pub use modules::{
    BriefingFields, DiagnosisFields, LaunchKitFields, QuickBriefingFields, TypedFields,
    WorkflowModule,
};
pub use resumption::{ResumeOffer, ResumptionController};
pub use sequencer::{StepProgress, StepSequencer, StepTransition};
pub use session::{field_map, ExtrasMap, FieldMap, FieldSource, FieldValue, WorkflowSession};
pub use validation::{Requirement, ValidationGate, ValidationOutcome};
