//! Mode routing
//!
//! Picks the step track for a mode and recomputes the current step whenever the
//! mode changes. The position is never copied across tracks:
//!
//! - if the new track's first step is already satisfied (the session carries
//!   upstream data), the session moves past it and on over every following
//!   step that is skippable and satisfied, landing on the first one that is
//!   not, or on the last step when every earlier one is;
//! - otherwise the step is clamped to the new track length.
//!
//! Both rules only ever move forward from the clamped position, which makes
//! reconciling twice with the same mode a no-op.

use super::definition::{StepDefinition, WorkflowDefinition, WorkflowMode};
use super::errors::WorkflowError;
use super::session::{FieldSource, WorkflowSession};
use super::validation::ValidationGate;

pub struct ModeRouter<'a> {
    definition: &'a WorkflowDefinition,
}

impl<'a> ModeRouter<'a> {
    pub fn new(definition: &'a WorkflowDefinition) -> Self {
        Self { definition }
    }

    /// Step track for a mode
    pub fn steps_for(&self, mode: WorkflowMode) -> Result<&'a [StepDefinition], WorkflowError> {
        match self.definition.track(mode) {
            Some(steps) if !steps.is_empty() => Ok(steps),
            Some(_) => Err(WorkflowError::EmptyTrack),
            None => Err(WorkflowError::UnsupportedMode {
                module_key: self.definition.module_key.clone(),
                mode,
            }),
        }
    }

    /// Return a copy of the session switched to `new_mode` with a recomputed step
    pub fn reconcile(
        &self,
        session: &WorkflowSession,
        new_mode: WorkflowMode,
    ) -> Result<WorkflowSession, WorkflowError> {
        let step = self.reconcile_step(session.current_step, &session.fields, new_mode)?;
        let mut reconciled = session.clone();
        reconciled.mode = new_mode;
        reconciled.current_step = step;
        Ok(reconciled)
    }

    /// Recompute a position for `new_mode` against any field record
    pub fn reconcile_step(
        &self,
        current_step: usize,
        fields: &dyn FieldSource,
        new_mode: WorkflowMode,
    ) -> Result<usize, WorkflowError> {
        let steps = self.steps_for(new_mode)?;
        let clamped = current_step.clamp(1, steps.len());

        let step = clamped.max(Self::landing_step(steps, fields));

        log::debug!(
            "Reconciled '{}' to {} mode: step {} -> {} of {}",
            self.definition.module_key,
            new_mode,
            current_step,
            step,
            steps.len()
        );
        Ok(step)
    }

    /// Where satisfied upstream data lets a session start.
    ///
    /// A satisfied first step is always passed; after it only skippable
    /// steps are. Returns 1 when the first step is not satisfied.
    pub fn landing_step(steps: &[StepDefinition], fields: &dyn FieldSource) -> usize {
        let last = steps.len().max(1);
        match steps.first() {
            Some(first) if ValidationGate::is_satisfied(first, fields) => {}
            _ => return 1,
        }
        steps
            .iter()
            .enumerate()
            .take(last - 1)
            .skip(1)
            .find(|(_, step)| !is_bypassable(step, fields))
            .map(|(idx, _)| idx + 1)
            .unwrap_or(last)
    }
}

fn is_bypassable(step: &StepDefinition, fields: &dyn FieldSource) -> bool {
    step.skippable && ValidationGate::is_satisfied(step, fields)
}
