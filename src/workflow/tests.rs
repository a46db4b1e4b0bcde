//! Cross-component tests for the workflow engine

use super::*;
use crate::activity::{
    ActivityQuery, ActivityRecorder, ActivityStore, ActivityType, MemoryActivityStore,
};
use crate::events::{notification_channel, WorkflowNotification};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

struct FixedGenerator(Result<GeneratedContent, CollaboratorError>);

#[async_trait]
impl ContentGenerator for FixedGenerator {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        self.0.clone()
    }
}

/// Holds its answer until released
struct GatedGenerator {
    release: Notify,
    seen: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl ContentGenerator for GatedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        self.seen.lock().unwrap().push(request);
        self.release.notified().await;
        Ok(GeneratedContent::Text("Late summary".to_string()))
    }
}

#[derive(Default)]
struct RecordingStore {
    fail: bool,
    created: Mutex<Vec<RecordDraft>>,
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn create_record(&self, draft: RecordDraft) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Request("service unavailable".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(draft);
        Ok(format!("rec-{}", created.len()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Quick intake (simple) that can be promoted to the complete track
fn intake() -> Arc<WorkflowDefinition> {
    Arc::new(
        WorkflowDefinition::new("intake", "Intake", ActivityType::PlanCreated)
            .with_generation_event(ActivityType::ProposalGenerated)
            .with_track(
                WorkflowMode::Simple,
                vec![
                    StepDefinition::new("Company").requires(&["companyName"]),
                    StepDefinition::new("Review"),
                ],
            )
            .with_track(
                WorkflowMode::Complete,
                vec![
                    StepDefinition::new("Company")
                        .requires(&["companyName"])
                        .skippable(),
                    StepDefinition::new("Segment").requires(&["segment"]),
                    StepDefinition::new("Goals").requires(&["goals"]),
                    StepDefinition::new("Review"),
                ],
            ),
    )
}

fn memory_store() -> (Arc<MemoryDraftBackend>, Arc<DraftStore>) {
    let backend = Arc::new(MemoryDraftBackend::new());
    let store = Arc::new(DraftStore::new(backend.clone(), ConflictPolicy::LastWriteWins));
    (backend, store)
}

fn enter_ready(
    definition: Arc<WorkflowDefinition>,
    services: WorkflowServices,
    options: EntryOptions,
) -> WorkflowInstance {
    WorkflowInstance::enter(definition, services, options)
        .unwrap()
        .ready()
        .unwrap()
}

fn complete_instance(services: WorkflowServices) -> WorkflowInstance {
    let mut instance = enter_ready(intake(), services, EntryOptions::mode(WorkflowMode::Complete));
    instance.set_field("companyName", "Acme").unwrap();
    instance.advance().unwrap();
    instance.set_field("segment", "Retail").unwrap();
    instance.advance().unwrap();
    instance.set_field("goals", "Grow").unwrap();
    instance.advance().unwrap();
    assert_eq!(instance.current_step(), 4);
    instance
}

// ---------------------------------------------------------------------------
// Sequencing and validation
// ---------------------------------------------------------------------------

#[test]
fn test_failed_validation_keeps_step_and_fields() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()),
        EntryOptions::mode(WorkflowMode::Complete),
    );

    // Interleave edits and advances; every failure must leave state untouched
    let edits: Vec<(&str, &str)> = vec![
        ("notes", "n/a"),
        ("companyName", "Acme"),
        ("goals", "Grow"),
        ("segment", ""),
        ("segment", "Retail"),
    ];
    for (name, value) in edits {
        instance.set_field(name, value).unwrap();
        let step_before = instance.current_step();
        let fields_before = instance.fields().clone();

        match instance.advance() {
            Ok(StepTransition::Advanced { from, to }) => assert_eq!(to, from + 1),
            Ok(other) => panic!("unexpected transition {:?}", other),
            Err(WorkflowError::ValidationFailed { step, failed_fields }) => {
                assert_eq!(step, step_before);
                assert!(!failed_fields.is_empty());
                assert_eq!(instance.current_step(), step_before);
                assert_eq!(instance.fields(), &fields_before);
                assert_eq!(store.get("intake").unwrap().current_step, step_before);
            }
            Err(e) => panic!("unexpected error {}", e),
        }
    }
    assert_eq!(instance.current_step(), 3);
}

#[test]
fn test_advance_twice_at_terminal_step() {
    let (_, store) = memory_store();
    let mut instance = complete_instance(WorkflowServices::new(store));

    assert_eq!(instance.advance().unwrap(), StepTransition::Stayed);
    assert_eq!(instance.current_step(), 4);
    assert_eq!(instance.advance().unwrap(), StepTransition::Stayed);
    assert_eq!(instance.current_step(), 4);
}

#[test]
fn test_retreat_never_validates() {
    let (_, store) = memory_store();
    let mut instance = complete_instance(WorkflowServices::new(store.clone()));
    instance.set_field("goals", "").unwrap();

    instance.retreat().unwrap();
    instance.retreat().unwrap();
    instance.retreat().unwrap();
    assert_eq!(instance.retreat().unwrap(), StepTransition::Stayed);
    assert_eq!(instance.current_step(), 1);
    assert_eq!(store.get("intake").unwrap().current_step, 1);
}

// ---------------------------------------------------------------------------
// Mode routing
// ---------------------------------------------------------------------------

#[test]
fn test_seeded_quick_intake_promoted_to_complete_lands_on_step_2() {
    let (_, store) = memory_store();
    let seed = SeedData::new("lead", field_map([("companyName", "Acme")]));
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store),
        EntryOptions::seeded(seed),
    );
    assert_eq!(instance.mode(), WorkflowMode::Simple);
    assert_eq!(instance.current_step(), 1);

    assert_eq!(instance.switch_mode(WorkflowMode::Complete).unwrap(), 2);
    assert_eq!(instance.step_count(), 4);
    assert_eq!(instance.progress().current_title, "Segment");

    // Switching again to the same mode changes nothing
    assert_eq!(instance.switch_mode(WorkflowMode::Complete).unwrap(), 2);
}

#[test]
fn test_diagnosis_promoted_with_client_chosen_lands_on_step_2() {
    let (_, store) = memory_store();
    let mut diagnosis = enter_ready(
        WorkflowModule::Diagnosis.definition(),
        WorkflowServices::new(store.clone()),
        EntryOptions::mode(WorkflowMode::Simple),
    );
    diagnosis.set_field("clientId", "client-1").unwrap();
    assert_eq!(diagnosis.current_step(), 1);

    // The client step is not skippable, but a satisfied first step is passed
    assert_eq!(diagnosis.switch_mode(WorkflowMode::Complete).unwrap(), 2);
    assert_eq!(diagnosis.progress().current_title, "Context");
    assert_eq!(store.get("diagnosis").unwrap().current_step, 2);
}

#[test]
fn test_diagnosis_promoted_without_client_stays_on_step_1() {
    let (_, store) = memory_store();
    let mut diagnosis = enter_ready(
        WorkflowModule::Diagnosis.definition(),
        WorkflowServices::new(store),
        EntryOptions::mode(WorkflowMode::Simple),
    );
    diagnosis.set_field("businessContext", "Retail chain").unwrap();

    assert_eq!(diagnosis.switch_mode(WorkflowMode::Complete).unwrap(), 1);
}

#[test]
fn test_plain_switch_clamps_position() {
    let (_, store) = memory_store();
    let mut instance = complete_instance(WorkflowServices::new(store.clone()));

    assert_eq!(instance.switch_mode(WorkflowMode::Simple).unwrap(), 2);
    let stored = store.get("intake").unwrap();
    assert_eq!(stored.mode, WorkflowMode::Simple);
    assert_eq!(stored.current_step, 2);
}

#[test]
fn test_unsupported_mode_leaves_instance_alone() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(
        WorkflowModule::QuickBriefing.definition(),
        WorkflowServices::new(store),
        EntryOptions::mode(WorkflowMode::Simple),
    );
    instance.set_field("companyName", "Acme").unwrap();
    instance.advance().unwrap();

    assert!(matches!(
        instance.switch_mode(WorkflowMode::Complete),
        Err(WorkflowError::UnsupportedMode { .. })
    ));
    assert_eq!(instance.mode(), WorkflowMode::Simple);
    assert_eq!(instance.current_step(), 2);
}

#[test]
fn test_entering_unsupported_mode_fails() {
    let (_, store) = memory_store();
    let err = WorkflowInstance::enter(
        WorkflowModule::QuickBriefing.definition(),
        WorkflowServices::new(store),
        EntryOptions::mode(WorkflowMode::Complete),
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::UnsupportedMode { .. }));
}

#[tokio::test]
async fn test_quick_briefing_handoff_skips_to_first_missing_step() {
    let (_, store) = memory_store();
    let records = Arc::new(RecordingStore::default());
    let services = WorkflowServices::new(store.clone()).with_record_store(records);

    let mut quick = enter_ready(
        WorkflowModule::QuickBriefing.definition(),
        services.clone(),
        EntryOptions::mode(WorkflowMode::Simple),
    );
    for (name, value) in [
        ("companyName", "Acme"),
        ("contactName", "Ana"),
        ("mainNeed", "More leads"),
    ] {
        quick.set_field(name, value).unwrap();
        quick.advance().unwrap();
    }
    quick.finalize().await.unwrap();

    let (target, mode) = WorkflowModule::QuickBriefing.handoff_target().unwrap();
    let briefing = enter_ready(
        target.definition(),
        services,
        EntryOptions::seeded(quick.handoff_seed(mode)),
    );

    assert_eq!(briefing.mode(), WorkflowMode::Complete);
    assert_eq!(briefing.current_step(), 2);
    assert_eq!(
        briefing.session().seeded_from.as_deref(),
        Some("briefing-quick")
    );
    assert!(store.get("briefing-quick").is_none());
}

// ---------------------------------------------------------------------------
// Drafts and resumption
// ---------------------------------------------------------------------------

#[test]
fn test_session_is_created_lazily() {
    let (backend, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()),
        EntryOptions::default(),
    );
    instance.retreat().unwrap();
    let _ = instance.advance();
    assert!(store.get("intake").is_none());

    instance.set_field("companyName", "Acme").unwrap();
    assert!(backend.load("intake").unwrap().is_some());
}

#[test]
fn test_resume_after_restart_is_identical() {
    let (backend, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store),
        EntryOptions::mode(WorkflowMode::Complete),
    );
    instance.set_field("companyName", "Acme").unwrap();
    instance.advance().unwrap();
    instance
        .set_fields(field_map([
            ("segment", FieldValue::from("Retail")),
            ("channels", FieldValue::set(["email", "events"])),
            ("budget", FieldValue::from(1500.0)),
            ("newsletter", FieldValue::from(false)),
        ]))
        .unwrap();
    instance.advance().unwrap();
    let before = instance.session().clone();
    drop(instance);

    // Simulated restart: fresh store over the same backend
    let restarted = Arc::new(DraftStore::new(backend, ConflictPolicy::LastWriteWins));
    let entry = WorkflowInstance::enter(
        intake(),
        WorkflowServices::new(restarted),
        EntryOptions::default(),
    )
    .unwrap();

    let offer = entry.offer().unwrap().clone();
    assert_eq!(offer.saved_step, 3);
    assert_eq!(offer.summary, "You were on step 3 of 4 (Goals)");

    let Entry::ResumeOffered { pending, .. } = entry else {
        panic!("expected a resume offer");
    };
    let resumed = pending.resume().unwrap();
    assert_eq!(resumed.session(), &before);
    assert_eq!(resumed.current_step(), 3);
    assert_eq!(resumed.mode(), WorkflowMode::Complete);
}

#[test]
fn test_discard_then_fresh_entry_starts_empty() {
    let (_, store) = memory_store();
    let mut instance = complete_instance(WorkflowServices::new(store.clone()));
    instance.set_field("goals", "Grow").unwrap();
    drop(instance);

    let entry = WorkflowInstance::enter(
        intake(),
        WorkflowServices::new(store.clone()),
        EntryOptions::default(),
    )
    .unwrap();
    let Entry::ResumeOffered { pending, .. } = entry else {
        panic!("expected a resume offer");
    };
    let fresh = pending.discard_and_restart().unwrap();

    assert!(store.get("intake").is_none());
    assert_eq!(fresh.current_step(), 1);
    assert!(fresh.fields().is_empty());

    let again = WorkflowInstance::enter(intake(), WorkflowServices::new(store), EntryOptions::default())
        .unwrap();
    assert!(again.offer().is_none());
}

#[test]
fn test_seeded_entry_takes_precedence_over_stale_draft() {
    let (_, store) = memory_store();
    let mut stale = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()),
        EntryOptions::mode(WorkflowMode::Complete),
    );
    stale.set_field("companyName", "Old Co").unwrap();
    stale.advance().unwrap();
    drop(stale);

    let seed = SeedData::new("lead", field_map([("companyName", "Acme")]))
        .with_mode(WorkflowMode::Complete);
    let mut seeded = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()),
        EntryOptions::seeded(seed),
    );
    assert_eq!(seeded.current_step(), 2);
    assert_eq!(
        seeded.fields().get("companyName"),
        Some(&FieldValue::from("Acme"))
    );

    // First edit replaces the stale draft entirely
    seeded.set_field("segment", "Retail").unwrap();
    let stored = store.get("intake").unwrap();
    assert_eq!(stored.fields.get("companyName"), Some(&FieldValue::from("Acme")));
    assert_eq!(stored.seeded_from.as_deref(), Some("lead"));
    assert!(!store.is_degraded("intake"));
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_generation_leaves_extras_unchanged() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()).with_generator(Arc::new(FixedGenerator(Err(
            CollaboratorError::Request("timeout".to_string()),
        )))),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();

    // Absent before, absent after
    let err = instance.generate("summary", &["companyName"]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::GenerationFailed(_)));
    assert!(instance.extras().get("summary").is_none());
    assert!(store.get("intake").unwrap().extras.get("summary").is_none());

    // A previous value survives a failed regeneration
    store.set_extras(
        "intake",
        ExtrasMap::from([("summary".to_string(), json!("Previous"))]),
    );
    instance.refresh_extras();
    assert!(instance.generate("summary", &[]).await.is_err());

    assert_eq!(
        store.get("intake").unwrap().extras.get("summary"),
        Some(&json!("Previous"))
    );
    assert_eq!(instance.extras().get("summary"), Some(&json!("Previous")));
    assert_eq!(instance.current_step(), 1);
}

#[tokio::test]
async fn test_error_payload_counts_as_failure() {
    let (_, store) = memory_store();
    let (tx, mut rx) = notification_channel();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone())
            .with_generator(Arc::new(FixedGenerator(Ok(GeneratedContent::Structured(
                json!({"error": "quota exceeded"}),
            )))))
            .with_notifier(tx),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();

    let err = instance.generate("diagnosis", &[]).await.unwrap_err();
    assert_eq!(
        err,
        WorkflowError::GenerationFailed("Service returned an error: quota exceeded".to_string())
    );
    assert!(store.get("intake").unwrap().extras.is_empty());

    let failed = std::iter::from_fn(|| rx.try_recv().ok())
        .find(|n| matches!(n, WorkflowNotification::GenerationFailed(_)));
    assert!(failed.is_some());
}

#[tokio::test]
async fn test_regeneration_overwrites() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()).with_generator(Arc::new(FixedGenerator(Ok(
            GeneratedContent::Text("Fresh summary".to_string()),
        )))),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();

    instance.generate("summary", &["companyName"]).await.unwrap();
    instance.generate("summary", &["companyName"]).await.unwrap();

    let stored = store.get("intake").unwrap();
    assert_eq!(stored.extras.len(), 1);
    assert_eq!(stored.extras.get("summary"), Some(&json!("Fresh summary")));
    assert_eq!(instance.extras(), &stored.extras);

    instance.clear_generated(&["summary"]).unwrap();
    assert!(store.get("intake").unwrap().extras.is_empty());
    assert!(instance.fields().has("companyName"));
}

#[tokio::test]
async fn test_generation_result_lands_after_unmount() {
    let (backend, store) = memory_store();
    let generator = Arc::new(GatedGenerator {
        release: Notify::new(),
        seen: Mutex::new(Vec::new()),
    });
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()).with_generator(generator.clone()),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();
    instance.set_field("notes", "private").unwrap();

    let handle = instance
        .generation_job("summary", &["companyName"])
        .unwrap()
        .spawn();

    // The user moves on and leaves the screen
    instance.advance().unwrap();
    drop(instance);

    generator.release.notify_one();
    handle.await.unwrap().unwrap();

    let seen = generator.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].input.contains_key("companyName"));
    assert!(!seen[0].input.contains_key("notes"));

    // Step stays where the user left it; the result is attached to the draft
    let restarted = Arc::new(DraftStore::new(backend, ConflictPolicy::LastWriteWins));
    let saved = restarted.get("intake").unwrap();
    assert_eq!(saved.current_step, 2);
    assert_eq!(saved.extras.get("summary"), Some(&json!("Late summary")));
}

fn gated() -> Arc<GatedGenerator> {
    Arc::new(GatedGenerator {
        release: Notify::new(),
        seen: Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn test_generation_finishing_after_finalize_leaves_no_draft() {
    let (backend, store) = memory_store();
    let generator = gated();
    let activity = Arc::new(MemoryActivityStore::new());
    let mut instance = complete_instance(
        WorkflowServices::new(store.clone())
            .with_generator(generator.clone())
            .with_record_store(Arc::new(RecordingStore::default()))
            .with_activity(ActivityRecorder::new(activity.clone(), "ws-1")),
    );

    let handle = instance.generation_job("summary", &[]).unwrap().spawn();
    instance.finalize().await.unwrap();
    assert!(store.get("intake").is_none());

    generator.release.notify_one();
    let value = handle.await.unwrap().unwrap();
    assert_eq!(value, json!("Late summary"));

    assert!(store.get("intake").is_none());
    assert!(backend.load("intake").unwrap().is_none());
    let again = WorkflowInstance::enter(
        intake(),
        WorkflowServices::new(store),
        EntryOptions::default(),
    )
    .unwrap();
    assert!(again.offer().is_none());

    // Only the completion is in the feed, not the dropped generation
    let page = activity
        .query(&ActivityQuery::workspace("ws-1"), 20)
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].event_type, ActivityType::PlanCreated);
}

#[tokio::test]
async fn test_generation_finishing_after_discard_leaves_no_draft() {
    let (_, store) = memory_store();
    let generator = gated();
    let services = WorkflowServices::new(store.clone()).with_generator(generator.clone());

    let mut instance = enter_ready(intake(), services.clone(), EntryOptions::default());
    instance.set_field("companyName", "Acme").unwrap();
    let handle = instance.generation_job("summary", &[]).unwrap().spawn();
    drop(instance);

    let Entry::ResumeOffered { pending, .. } =
        WorkflowInstance::enter(intake(), services.clone(), EntryOptions::default()).unwrap()
    else {
        panic!("expected a resume offer");
    };
    let fresh = pending.discard_and_restart().unwrap();

    generator.release.notify_one();
    handle.await.unwrap().unwrap();

    assert!(store.get("intake").is_none());
    assert!(fresh.extras().is_empty());
    let again = WorkflowInstance::enter(intake(), services, EntryOptions::default()).unwrap();
    assert!(again.offer().is_none());
}

#[tokio::test]
async fn test_generation_started_after_discard_is_kept() {
    let (_, store) = memory_store();
    store.set_fields("intake", field_map([("companyName", "Old")]));
    store.clear("intake");

    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store.clone()).with_generator(Arc::new(FixedGenerator(Ok(
            GeneratedContent::Text("Summary".to_string()),
        )))),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();
    instance.generate("summary", &[]).await.unwrap();

    assert_eq!(
        store.get("intake").unwrap().extras.get("summary"),
        Some(&json!("Summary"))
    );
}

#[tokio::test]
async fn test_generation_records_activity() {
    let (_, store) = memory_store();
    let activity = Arc::new(MemoryActivityStore::new());
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store)
            .with_generator(Arc::new(FixedGenerator(Ok(GeneratedContent::Text(
                "Summary".to_string(),
            )))))
            .with_activity(ActivityRecorder::new(activity.clone(), "ws-1")),
        EntryOptions::default(),
    );
    instance.set_field("companyName", "Acme").unwrap();
    instance.generate("summary", &[]).await.unwrap();

    let page = activity
        .query(
            &ActivityQuery::workspace("ws-1").workflow_instance(instance.id()),
            20,
        )
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].event_type, ActivityType::ProposalGenerated);
}

#[tokio::test]
async fn test_generation_without_generator() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(intake(), WorkflowServices::new(store), EntryOptions::default());
    let err = instance.generate("summary", &[]).await.unwrap_err();
    assert!(err.is_retryable());
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_finalize_creates_record_clears_draft_and_records_activity() {
    let (_, store) = memory_store();
    let records = Arc::new(RecordingStore::default());
    let activity = Arc::new(MemoryActivityStore::new());
    let (tx, mut rx) = notification_channel();
    let mut instance = complete_instance(
        WorkflowServices::new(store.clone())
            .with_record_store(records.clone())
            .with_activity(ActivityRecorder::new(activity.clone(), "ws-1"))
            .with_notifier(tx),
    );
    instance.set_field("clientId", "client-7").unwrap();

    let record_id = instance.finalize().await.unwrap();
    assert_eq!(record_id, "rec-1");
    assert!(instance.is_finalized());
    assert!(store.get("intake").is_none());

    let created = records.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].workspace_id.as_deref(), Some("ws-1"));
    assert!(created[0].fields.has("goals"));

    let page = activity
        .query(&ActivityQuery::workspace("ws-1").client("client-7"), 20)
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].event_type, ActivityType::PlanCreated);
    assert_eq!(page.events[0].metadata["recordId"], "rec-1");

    let mut completed = false;
    while let Ok(notification) = rx.try_recv() {
        if let WorkflowNotification::Completed(payload) = notification {
            assert_eq!(payload.record_id, "rec-1");
            completed = true;
        }
    }
    assert!(completed);

    // Finished workflows reject further edits
    assert_eq!(
        instance.set_field("goals", "More").unwrap_err(),
        WorkflowError::AlreadyFinalized("intake".to_string())
    );
    assert!(instance.advance().is_err());
    assert!(matches!(
        instance.finalize().await,
        Err(WorkflowError::AlreadyFinalized(_))
    ));
}

#[tokio::test]
async fn test_failed_record_creation_keeps_draft_and_skips_activity() {
    let (_, store) = memory_store();
    let activity = Arc::new(MemoryActivityStore::new());
    let (tx, mut rx) = notification_channel();
    let mut instance = complete_instance(
        WorkflowServices::new(store.clone())
            .with_record_store(Arc::new(RecordingStore {
                fail: true,
                created: Mutex::new(Vec::new()),
            }))
            .with_activity(ActivityRecorder::new(activity.clone(), "ws-1"))
            .with_notifier(tx),
    );

    let err = instance.finalize().await.unwrap_err();
    assert!(matches!(err, WorkflowError::RecordCreationFailed(_)));
    assert!(!instance.is_finalized());

    let saved = store.get("intake").unwrap();
    assert_eq!(saved.current_step, 4);
    assert!(saved.fields.has("goals"));
    assert!(activity.is_empty());

    let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|n| n.event_name())
        .collect();
    assert!(names.contains(&"record:creation_failed"));
    assert!(!names.contains(&"workflow:completed"));
}

#[tokio::test]
async fn test_finalize_only_from_terminal_step() {
    let (_, store) = memory_store();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store)
            .with_record_store(Arc::new(RecordingStore::default())),
        EntryOptions::mode(WorkflowMode::Complete),
    );
    instance.set_field("companyName", "Acme").unwrap();

    assert_eq!(
        instance.finalize().await.unwrap_err(),
        WorkflowError::NotAtTerminalStep {
            current: 1,
            terminal: 4
        }
    );
}

// ---------------------------------------------------------------------------
// Degraded persistence
// ---------------------------------------------------------------------------

struct ReadOnlyBackend;

impl DraftBackend for ReadOnlyBackend {
    fn load(&self, _key: &str) -> Result<Option<WorkflowSession>, DraftStoreError> {
        Ok(None)
    }
    fn write(&self, _: &str, _: u64, _: &WorkflowSession) -> Result<u64, DraftStoreError> {
        Err(DraftStoreError::Io("read-only file system".to_string()))
    }
    fn remove(&self, _key: &str) -> Result<(), DraftStoreError> {
        Ok(())
    }
    fn keys(&self) -> Result<Vec<String>, DraftStoreError> {
        Ok(Vec::new())
    }
}

#[test]
fn test_degraded_persistence_never_blocks() {
    let store = Arc::new(DraftStore::new(
        Arc::new(ReadOnlyBackend),
        ConflictPolicy::LastWriteWins,
    ));
    let (tx, mut rx) = notification_channel();
    let mut instance = enter_ready(
        intake(),
        WorkflowServices::new(store).with_notifier(tx),
        EntryOptions::default(),
    );

    instance.set_field("companyName", "Acme").unwrap();
    instance.advance().unwrap();
    assert_eq!(instance.current_step(), 2);
    assert!(matches!(
        instance.persistence_status(),
        Err(WorkflowError::PersistenceDegraded { .. })
    ));

    let first = rx.try_recv().unwrap();
    assert_eq!(first.event_name(), "draft:persistence_degraded");
}

/// Writes succeed but stored drafts can never be removed
struct StickyBackend(MemoryDraftBackend);

impl DraftBackend for StickyBackend {
    fn load(&self, key: &str) -> Result<Option<WorkflowSession>, DraftStoreError> {
        self.0.load(key)
    }
    fn write(
        &self,
        key: &str,
        expected_revision: u64,
        session: &WorkflowSession,
    ) -> Result<u64, DraftStoreError> {
        self.0.write(key, expected_revision, session)
    }
    fn remove(&self, _key: &str) -> Result<(), DraftStoreError> {
        Err(DraftStoreError::Io("permission denied".to_string()))
    }
    fn keys(&self) -> Result<Vec<String>, DraftStoreError> {
        self.0.keys()
    }
}

fn sticky_store() -> Arc<DraftStore> {
    Arc::new(DraftStore::new(
        Arc::new(StickyBackend(MemoryDraftBackend::new())),
        ConflictPolicy::LastWriteWins,
    ))
}

#[tokio::test]
async fn test_finalize_reports_draft_that_could_not_be_removed() {
    let store = sticky_store();
    let (tx, mut rx) = notification_channel();
    let mut instance = complete_instance(
        WorkflowServices::new(store.clone())
            .with_record_store(Arc::new(RecordingStore::default()))
            .with_notifier(tx),
    );

    // The record exists, so finalization still succeeds
    assert_eq!(instance.finalize().await.unwrap(), "rec-1");
    assert!(instance.is_finalized());
    assert!(store.is_degraded("intake"));

    let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|n| n.event_name())
        .collect();
    assert!(names.contains(&"draft:persistence_degraded"));
    assert!(names.contains(&"workflow:completed"));
}

#[test]
fn test_discard_reports_draft_that_could_not_be_removed() {
    let store = sticky_store();
    let (tx, mut rx) = notification_channel();
    let services = WorkflowServices::new(store.clone()).with_notifier(tx);

    let mut instance = enter_ready(intake(), services.clone(), EntryOptions::default());
    instance.set_field("companyName", "Acme").unwrap();
    drop(instance);
    while rx.try_recv().is_ok() {}

    let Entry::ResumeOffered { pending, .. } =
        WorkflowInstance::enter(intake(), services, EntryOptions::default()).unwrap()
    else {
        panic!("expected a resume offer");
    };
    let fresh = pending.discard_and_restart().unwrap();
    assert_eq!(fresh.current_step(), 1);
    assert!(store.is_degraded("intake"));

    let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|n| n.event_name())
        .collect();
    assert!(names.contains(&"draft:persistence_degraded"));
}
