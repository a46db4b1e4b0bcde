//! A live workflow instance
//!
//! Ties the components together the way a screen uses them: resumption check
//! on entry, sequencer initialized from the saved or seeded position, every
//! edit written through to the draft store, the validation gate consulted on
//! advance, the mode router replacing the track on mode switches, and
//! finalization handing the result to the record store before clearing the
//! draft.

use serde_json::Value;
use std::sync::Arc;

use super::collaborators::{
    ContentGenerator, GenerationRequest, RecordDraft, RecordStore,
};
use super::definition::{WorkflowDefinition, WorkflowMode};
use super::draft_store::{DraftStore, DraftWrite};
use super::errors::WorkflowError;
use super::mode::ModeRouter;
use super::resumption::{ResumeOffer, ResumptionController};
use super::sequencer::{StepProgress, StepSequencer, StepTransition};
use super::session::{ExtrasMap, FieldMap, FieldValue, WorkflowSession};
use super::validation::ValidationOutcome;
use crate::activity::{
    ActivityMetadata, ActivityRecorder, META_CLIENT_ID, META_MODULE_KEY, META_RECORD_ID,
    META_WORKFLOW_INSTANCE_ID,
};
use crate::events::{
    notify, GenerationCompletedPayload, GenerationFailedPayload, ModeChangedPayload,
    NotificationSender, PersistenceDegradedPayload, RecordCreationFailedPayload,
    StepChangedPayload, WorkflowCompletedPayload, WorkflowNotification,
};

/// Shared collaborators of every workflow instance
#[derive(Clone)]
pub struct WorkflowServices {
    pub store: Arc<DraftStore>,
    pub generator: Option<Arc<dyn ContentGenerator>>,
    pub records: Option<Arc<dyn RecordStore>>,
    pub activity: Option<ActivityRecorder>,
    pub notifier: Option<NotificationSender>,
}

impl WorkflowServices {
    pub fn new(store: Arc<DraftStore>) -> Self {
        Self {
            store,
            generator: None,
            records: None,
            activity: None,
            notifier: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_activity(mut self, recorder: ActivityRecorder) -> Self {
        self.activity = Some(recorder);
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationSender) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn notify(&self, notification: WorkflowNotification) {
        notify(self.notifier.as_ref(), notification);
    }

    fn report_write(&self, module_key: &str, write: DraftWrite) {
        if let DraftWrite::Degraded { reason } = write {
            self.notify(WorkflowNotification::PersistenceDegraded(
                PersistenceDegradedPayload {
                    module_key: module_key.to_string(),
                    reason,
                },
            ));
        }
    }
}

/// Initial values handed over by an upstream source
#[derive(Debug, Clone, PartialEq)]
pub struct SeedData {
    /// Label of the source, e.g. "lead" or "briefing-quick"
    pub source: String,
    pub fields: FieldMap,
    /// Mode to open in; falls back to the entry options
    pub mode: Option<WorkflowMode>,
}

impl SeedData {
    pub fn new(source: &str, fields: FieldMap) -> Self {
        Self {
            source: source.to_string(),
            fields,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub mode: WorkflowMode,
    pub seed: Option<SeedData>,
}

impl EntryOptions {
    pub fn mode(mode: WorkflowMode) -> Self {
        Self { mode, seed: None }
    }

    pub fn seeded(seed: SeedData) -> Self {
        Self {
            mode: seed.mode.unwrap_or_default(),
            seed: Some(seed),
        }
    }
}

/// Result of entering a workflow
pub enum Entry {
    Ready(WorkflowInstance),
    /// A saved draft exists; the caller must pick one of the two actions
    ResumeOffered {
        offer: ResumeOffer,
        pending: PendingEntry,
    },
}

impl Entry {
    pub fn offer(&self) -> Option<&ResumeOffer> {
        match self {
            Entry::Ready(_) => None,
            Entry::ResumeOffered { offer, .. } => Some(offer),
        }
    }

    pub fn ready(self) -> Option<WorkflowInstance> {
        match self {
            Entry::Ready(instance) => Some(instance),
            Entry::ResumeOffered { .. } => None,
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Ready(instance) => f.debug_tuple("Ready").field(instance).finish(),
            Entry::ResumeOffered { offer, .. } => f
                .debug_struct("ResumeOffered")
                .field("offer", offer)
                .finish_non_exhaustive(),
        }
    }
}

/// Entry waiting on the user's resume-or-restart decision
pub struct PendingEntry {
    definition: Arc<WorkflowDefinition>,
    services: WorkflowServices,
    mode: WorkflowMode,
}

impl PendingEntry {
    /// Continue the saved draft exactly where it was left
    pub fn resume(self) -> Result<WorkflowInstance, WorkflowError> {
        let controller =
            ResumptionController::new(self.services.store.clone(), self.definition.clone());
        match controller.resume() {
            Some(session) => {
                WorkflowInstance::from_session(self.definition, self.services, session, true)
            }
            None => {
                let session = WorkflowSession::new(&self.definition.module_key, self.mode);
                WorkflowInstance::from_session(self.definition, self.services, session, false)
            }
        }
    }

    /// Throw the saved draft away and start at step 1
    pub fn discard_and_restart(self) -> Result<WorkflowInstance, WorkflowError> {
        let controller =
            ResumptionController::new(self.services.store.clone(), self.definition.clone());
        let (session, write) = controller.discard_and_restart(self.mode);
        self.services.report_write(self.definition.module_key.as_str(), write);
        WorkflowInstance::from_session(self.definition, self.services, session, false)
    }
}

pub struct WorkflowInstance {
    id: String,
    definition: Arc<WorkflowDefinition>,
    services: WorkflowServices,
    session: WorkflowSession,
    sequencer: StepSequencer,
    /// Whether the draft store holds this session yet
    persisted: bool,
    finalized: bool,
}

impl std::fmt::Debug for WorkflowInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowInstance")
            .field("id", &self.id)
            .field("module_key", &self.definition.module_key)
            .field("mode", &self.session.mode)
            .field("current_step", &self.sequencer.current())
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl WorkflowInstance {
    /// Enter a workflow: offer resumption, apply seed data, or start fresh
    pub fn enter(
        definition: Arc<WorkflowDefinition>,
        services: WorkflowServices,
        options: EntryOptions,
    ) -> Result<Entry, WorkflowError> {
        let mode = options
            .seed
            .as_ref()
            .and_then(|seed| seed.mode)
            .unwrap_or(options.mode);
        ModeRouter::new(&definition).steps_for(mode)?;

        let controller = ResumptionController::new(services.store.clone(), definition.clone());
        if let Some(offer) = controller.check(options.seed.is_some()) {
            return Ok(Entry::ResumeOffered {
                offer,
                pending: PendingEntry {
                    definition,
                    services,
                    mode,
                },
            });
        }

        let mut session = WorkflowSession::new(&definition.module_key, mode);
        if let Some(seed) = options.seed {
            session.fields = seed.fields;
            session.seeded_from = Some(seed.source);
            session = ModeRouter::new(&definition).reconcile(&session, mode)?;
            log::info!(
                "Entered '{}' seeded from {:?} at step {}",
                definition.module_key,
                session.seeded_from,
                session.current_step
            );
        }

        Self::from_session(definition, services, session, false).map(Entry::Ready)
    }

    fn from_session(
        definition: Arc<WorkflowDefinition>,
        services: WorkflowServices,
        mut session: WorkflowSession,
        persisted: bool,
    ) -> Result<Self, WorkflowError> {
        let steps = ModeRouter::new(&definition).steps_for(session.mode)?.to_vec();
        let sequencer = StepSequencer::new(steps, session.current_step)?;
        session.current_step = sequencer.current();

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            definition,
            services,
            session,
            sequencer,
            persisted,
            finalized: false,
        })
    }

    /// Identifier of this run, linked from activity events
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_key(&self) -> &str {
        &self.definition.module_key
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn session(&self) -> &WorkflowSession {
        &self.session
    }

    pub fn current_step(&self) -> usize {
        self.sequencer.current()
    }

    pub fn step_count(&self) -> usize {
        self.sequencer.step_count()
    }

    pub fn mode(&self) -> WorkflowMode {
        self.session.mode
    }

    pub fn fields(&self) -> &FieldMap {
        &self.session.fields
    }

    pub fn extras(&self) -> &ExtrasMap {
        &self.session.extras
    }

    pub fn progress(&self) -> StepProgress {
        self.sequencer.progress()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// `PersistenceDegraded` while the last draft write only reached memory
    pub fn persistence_status(&self) -> Result<(), WorkflowError> {
        if self.persisted && self.services.store.is_degraded(self.module_key()) {
            return Err(WorkflowError::PersistenceDegraded {
                module_key: self.module_key().to_string(),
                reason: "last draft write failed".to_string(),
            });
        }
        Ok(())
    }

    /// Validate the current step without moving
    pub fn validate_current(&self) -> ValidationOutcome {
        self.sequencer.validate_current(&self.session.fields)
    }

    fn ensure_active(&self) -> Result<(), WorkflowError> {
        if self.finalized {
            return Err(WorkflowError::AlreadyFinalized(self.module_key().to_string()));
        }
        Ok(())
    }

    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), WorkflowError> {
        let mut partial = FieldMap::new();
        partial.insert(name.to_string(), value.into());
        self.set_fields(partial)
    }

    /// Merge edits and write them through. The first edit creates the draft.
    pub fn set_fields(&mut self, partial: FieldMap) -> Result<(), WorkflowError> {
        self.ensure_active()?;
        self.session.merge_fields(partial.clone());

        let write = if self.persisted {
            self.services.store.set_fields(self.module_key(), partial)
        } else {
            self.persisted = true;
            self.services.store.save(&self.session)
        };
        self.write_through(write);
        Ok(())
    }

    /// Report the write and adopt the stored copy, which carries the revision
    /// and any extras written by detached jobs
    fn write_through(&mut self, write: DraftWrite) {
        self.services.report_write(self.module_key(), write);
        if let Some(stored) = self.services.store.get(self.module_key()) {
            self.session = stored;
        }
    }

    /// Move forward one step; fields and position stay unchanged on failure
    pub fn advance(&mut self) -> Result<StepTransition, WorkflowError> {
        self.ensure_active()?;
        let transition = self.sequencer.advance(&self.session.fields)?;
        self.apply_transition(transition);
        Ok(transition)
    }

    /// Move back one step; never validates
    pub fn retreat(&mut self) -> Result<StepTransition, WorkflowError> {
        self.ensure_active()?;
        let transition = self.sequencer.retreat();
        self.apply_transition(transition);
        Ok(transition)
    }

    fn apply_transition(&mut self, transition: StepTransition) {
        let (from, to) = match transition {
            StepTransition::Advanced { from, to } | StepTransition::Retreated { from, to } => {
                (from, to)
            }
            StepTransition::Stayed => return,
        };

        self.session.current_step = to;
        self.session.touch();
        if self.persisted {
            let write = self.services.store.set_step(self.module_key(), to);
            self.write_through(write);
        }
        self.services
            .notify(WorkflowNotification::StepChanged(StepChangedPayload {
                module_key: self.module_key().to_string(),
                from_step: from,
                to_step: to,
                step_count: self.sequencer.step_count(),
            }));
    }

    /// Switch track; the position is recomputed by the mode router
    pub fn switch_mode(&mut self, new_mode: WorkflowMode) -> Result<usize, WorkflowError> {
        self.ensure_active()?;
        let router = ModeRouter::new(&self.definition);
        let reconciled = router.reconcile(&self.session, new_mode)?;
        let steps = router.steps_for(new_mode)?.to_vec();
        self.sequencer
            .replace_steps(steps, reconciled.current_step)?;

        let old_mode = self.session.mode;
        self.session = reconciled;
        self.session.touch();

        if self.persisted {
            let write = self.services.store.set_position(
                self.module_key(),
                new_mode,
                self.session.current_step,
            );
            self.write_through(write);
        }
        self.services
            .notify(WorkflowNotification::ModeChanged(ModeChangedPayload {
                module_key: self.module_key().to_string(),
                old_mode,
                new_mode,
                current_step: self.session.current_step,
            }));
        Ok(self.session.current_step)
    }

    /// Build a detached generation job writing into `extras[target]`.
    ///
    /// `input` names the fields sent to the generator; an empty list sends all.
    pub fn generation_job(
        &self,
        target: &str,
        input: &[&str],
    ) -> Result<GenerationJob, WorkflowError> {
        self.ensure_active()?;
        let generator = self.services.generator.clone().ok_or_else(|| {
            WorkflowError::GenerationFailed("no content generator configured".to_string())
        })?;

        let fields: FieldMap = if input.is_empty() {
            self.session.fields.clone()
        } else {
            self.session
                .fields
                .iter()
                .filter(|(name, _)| input.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        };

        Ok(GenerationJob {
            generator,
            store: self.services.store.clone(),
            activity: self.services.activity.clone(),
            notifier: self.services.notifier.clone(),
            generation_event: self.definition.generation_event,
            definition_title: self.definition.title.clone(),
            workflow_instance_id: self.id.clone(),
            snapshot: self.session.clone(),
            clear_epoch: self.services.store.clear_epoch(self.module_key()),
            request: GenerationRequest {
                module_key: self.module_key().to_string(),
                target: target.to_string(),
                input: fields,
            },
        })
    }

    /// Run generation and wait for it. On failure extras are left as they were.
    pub async fn generate(&mut self, target: &str, input: &[&str]) -> Result<Value, WorkflowError> {
        let job = self.generation_job(target, input)?;
        let value = job.run().await?;
        self.persisted = true;
        self.refresh_extras();
        Ok(value)
    }

    /// Pull extras written by detached jobs into this view
    pub fn refresh_extras(&mut self) {
        if let Some(stored) = self.services.store.get(self.module_key()) {
            self.session.extras = stored.extras;
        }
    }

    /// Drop generated content without touching fields
    pub fn clear_generated(&mut self, names: &[&str]) -> Result<(), WorkflowError> {
        self.ensure_active()?;
        self.session.remove_extras(names);
        if let Some(write) = self.services.store.clear_extras(self.module_key(), names) {
            self.services.report_write(self.module_key(), write);
        }
        Ok(())
    }

    /// Create the business record from the terminal step.
    ///
    /// The draft is cleared only if the record store confirms creation; on
    /// failure it is persisted so the user can retry without retyping.
    pub async fn finalize(&mut self) -> Result<String, WorkflowError> {
        self.ensure_active()?;
        if !self.sequencer.is_terminal() {
            return Err(WorkflowError::NotAtTerminalStep {
                current: self.sequencer.current(),
                terminal: self.sequencer.step_count(),
            });
        }
        if let ValidationOutcome::Failed { failed_fields } = self.validate_current() {
            return Err(WorkflowError::ValidationFailed {
                step: self.sequencer.current(),
                failed_fields,
            });
        }
        let records = self.services.records.clone().ok_or_else(|| {
            WorkflowError::RecordCreationFailed("no record store configured".to_string())
        })?;

        self.refresh_extras();
        let draft = RecordDraft {
            module_key: self.module_key().to_string(),
            workflow_instance_id: self.id.clone(),
            workspace_id: self
                .services
                .activity
                .as_ref()
                .map(|recorder| recorder.workspace_id().to_string()),
            mode: self.session.mode,
            fields: self.session.fields.clone(),
            extras: self.session.extras.clone(),
        };

        match records.create_record(draft).await {
            Ok(record_id) => {
                let write = self.services.store.clear(self.module_key());
                self.services.report_write(self.module_key(), write);
                self.finalized = true;
                log::info!(
                    "Finalized '{}' as record {}",
                    self.module_key(),
                    record_id
                );
                self.record_completion(&record_id);
                self.services
                    .notify(WorkflowNotification::Completed(WorkflowCompletedPayload {
                        module_key: self.module_key().to_string(),
                        workflow_instance_id: self.id.clone(),
                        record_id: record_id.clone(),
                    }));
                Ok(record_id)
            }
            Err(e) => {
                log::warn!("Record creation for '{}' failed: {}", self.module_key(), e);
                self.persisted = true;
                let write = self.services.store.save(&self.session);
                self.services.report_write(self.module_key(), write);
                self.services.notify(WorkflowNotification::RecordCreationFailed(
                    RecordCreationFailedPayload {
                        module_key: self.module_key().to_string(),
                        workflow_instance_id: self.id.clone(),
                        error: e.to_string(),
                    },
                ));
                Err(WorkflowError::RecordCreationFailed(e.to_string()))
            }
        }
    }

    fn record_completion(&self, record_id: &str) {
        let Some(recorder) = &self.services.activity else {
            return;
        };
        let mut metadata = ActivityMetadata::new();
        metadata.insert(META_RECORD_ID.to_string(), record_id.into());
        metadata.insert(META_MODULE_KEY.to_string(), self.module_key().into());
        metadata.insert(META_WORKFLOW_INSTANCE_ID.to_string(), self.id.as_str().into());
        if let Some(client_id) = self.session.fields.get("clientId").and_then(|v| v.as_text()) {
            metadata.insert(META_CLIENT_ID.to_string(), client_id.into());
        }

        recorder.record(
            self.definition.completion_event,
            &format!("{} completed", self.definition.title),
            &format!("Created record {}", record_id),
            metadata,
        );
    }

    /// Seed data for entering a downstream workflow from this one
    pub fn handoff_seed(&self, mode: WorkflowMode) -> SeedData {
        SeedData::new(self.module_key(), self.session.fields.clone()).with_mode(mode)
    }
}

/// A generation call that owns everything it needs.
///
/// It can outlive the instance that created it; the result still lands in the
/// draft's extras so a later resume sees it.
pub struct GenerationJob {
    generator: Arc<dyn ContentGenerator>,
    store: Arc<DraftStore>,
    activity: Option<ActivityRecorder>,
    notifier: Option<NotificationSender>,
    generation_event: Option<crate::activity::ActivityType>,
    definition_title: String,
    workflow_instance_id: String,
    snapshot: WorkflowSession,
    clear_epoch: u64,
    request: GenerationRequest,
}

impl GenerationJob {
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// Generate and store the result as an extra. If the draft was cleared
    /// after the job was created the value is returned but not stored.
    pub async fn run(self) -> Result<Value, WorkflowError> {
        let module_key = self.request.module_key.clone();
        let target = self.request.target.clone();

        let result = self
            .generator
            .generate(self.request.clone())
            .await
            .and_then(|content| content.into_extra());

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Generation of '{}' for '{}' failed: {}", target, module_key, e);
                notify(
                    self.notifier.as_ref(),
                    WorkflowNotification::GenerationFailed(GenerationFailedPayload {
                        module_key,
                        target,
                        error: e.to_string(),
                    }),
                );
                return Err(WorkflowError::GenerationFailed(e.to_string()));
            }
        };

        let mut extras = ExtrasMap::new();
        extras.insert(target.clone(), value.clone());
        // A draft finalized or discarded while generating stays gone
        let Some(write) = self
            .store
            .set_extras_since(self.clear_epoch, &self.snapshot, extras)
        else {
            log::info!(
                "Discarding '{}' for '{}': the draft was cleared during generation",
                target,
                module_key
            );
            return Ok(value);
        };
        if let DraftWrite::Degraded { reason } = write {
            notify(
                self.notifier.as_ref(),
                WorkflowNotification::PersistenceDegraded(PersistenceDegradedPayload {
                    module_key: module_key.clone(),
                    reason,
                }),
            );
        }

        if let (Some(recorder), Some(event_type)) = (&self.activity, self.generation_event) {
            let mut metadata = ActivityMetadata::new();
            metadata.insert(META_MODULE_KEY.to_string(), module_key.as_str().into());
            metadata.insert(
                META_WORKFLOW_INSTANCE_ID.to_string(),
                self.workflow_instance_id.as_str().into(),
            );
            metadata.insert("target".to_string(), target.as_str().into());
            recorder.record(
                event_type,
                &format!("{} content generated", self.definition_title),
                &format!("Generated {}", target),
                metadata,
            );
        }

        notify(
            self.notifier.as_ref(),
            WorkflowNotification::GenerationCompleted(GenerationCompletedPayload {
                module_key,
                target,
            }),
        );
        Ok(value)
    }

    /// Run on the tokio runtime without waiting
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<Value, WorkflowError>> {
        tokio::spawn(self.run())
    }
}
