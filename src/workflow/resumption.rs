//! Resumption on workflow entry
//!
//! When a workflow is entered without seed data and a draft with user input
//! exists under its key, the user is offered a choice: resume where they left
//! off or discard the draft and start over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::definition::{WorkflowDefinition, WorkflowMode};
use super::draft_store::{DraftStore, DraftWrite};
use super::mode::ModeRouter;
use super::session::WorkflowSession;

/// Offer to continue a saved draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeOffer {
    pub module_key: String,
    pub saved_step: usize,
    pub step_count: usize,
    pub mode: WorkflowMode,
    pub step_title: String,
    /// e.g. "You were on step 3 of 4 (Goals)"
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

pub struct ResumptionController {
    store: Arc<DraftStore>,
    definition: Arc<WorkflowDefinition>,
}

impl ResumptionController {
    pub fn new(store: Arc<DraftStore>, definition: Arc<WorkflowDefinition>) -> Self {
        Self { store, definition }
    }

    fn key(&self) -> &str {
        &self.definition.module_key
    }

    /// Offer resumption, unless the entry is seeded or nothing was typed yet
    pub fn check(&self, seeded: bool) -> Option<ResumeOffer> {
        if seeded {
            log::info!(
                "Entering '{}' with seed data; not offering resumption",
                self.key()
            );
            return None;
        }

        let saved = self.store.get(self.key())?;
        if !saved.has_input() {
            return None;
        }

        let restored = self.restore(saved)?;
        let steps = ModeRouter::new(&self.definition)
            .steps_for(restored.mode)
            .ok()?;
        let step_title = steps[restored.current_step - 1].title.clone();

        log::info!(
            "Offering to resume '{}' at step {} of {}",
            self.key(),
            restored.current_step,
            steps.len()
        );

        Some(ResumeOffer {
            module_key: restored.module_key.clone(),
            saved_step: restored.current_step,
            step_count: steps.len(),
            mode: restored.mode,
            summary: format!(
                "You were on step {} of {} ({})",
                restored.current_step,
                steps.len(),
                step_title
            ),
            step_title,
            updated_at: restored.updated_at,
        })
    }

    /// Load the saved session as-is (no validation), with its step made valid
    /// for its mode
    pub fn resume(&self) -> Option<WorkflowSession> {
        let saved = self.store.get(self.key())?;
        let restored = self.restore(saved)?;
        log::info!(
            "Resuming '{}' at step {}",
            self.key(),
            restored.current_step
        );
        Some(restored)
    }

    /// Drop the saved draft and start at step 1 with empty fields.
    ///
    /// The fresh session is returned even when the stored copy could not be
    /// removed; the returned write says whether removal reached the backend.
    pub fn discard_and_restart(&self, mode: WorkflowMode) -> (WorkflowSession, DraftWrite) {
        log::info!("Discarding saved draft for '{}'", self.key());
        let write = self.store.clear(self.key());
        if write.is_degraded() {
            log::warn!(
                "Saved draft for '{}' could not be removed and may be offered again",
                self.key()
            );
        }
        (WorkflowSession::new(self.key(), mode), write)
    }

    fn restore(&self, saved: WorkflowSession) -> Option<WorkflowSession> {
        let router = ModeRouter::new(&self.definition);
        match router.steps_for(saved.mode) {
            Ok(steps) => {
                let mut restored = saved;
                restored.current_step = restored.current_step.clamp(1, steps.len());
                Some(restored)
            }
            Err(e) => {
                // Saved under a mode this module no longer has
                let fallback = self.definition.modes().into_iter().next()?;
                log::warn!(
                    "Saved draft for '{}' is unusable as-is ({}); moving it to {} mode",
                    self.key(),
                    e,
                    fallback
                );
                router.reconcile(&saved, fallback).ok()
            }
        }
    }
}
