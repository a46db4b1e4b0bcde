//! Step sequencing
//!
//! Holds the active track and the 1-indexed current step. User-initiated moves
//! forward go through the validation gate; system moves (`jump_to`) do not.

use serde::{Deserialize, Serialize};

use super::definition::StepDefinition;
use super::errors::WorkflowError;
use super::session::FieldSource;
use super::validation::{ValidationGate, ValidationOutcome};

/// Result of a step transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTransition {
    Advanced { from: usize, to: usize },
    Retreated { from: usize, to: usize },
    /// Nothing moved (terminal advance, retreat at step 1)
    Stayed,
}

impl StepTransition {
    pub fn moved(&self) -> bool {
        !matches!(self, StepTransition::Stayed)
    }
}

/// Progress info for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub current: usize,
    pub total: usize,
    pub current_title: String,
    pub titles: Vec<String>,
    /// 0-100
    pub percentage: u8,
    pub is_terminal: bool,
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    steps: Vec<StepDefinition>,
    current: usize,
}

impl StepSequencer {
    /// Create a sequencer; the initial step is clamped into the track
    pub fn new(steps: Vec<StepDefinition>, initial: usize) -> Result<Self, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::EmptyTrack);
        }
        let current = initial.clamp(1, steps.len());
        Ok(Self { steps, current })
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &StepDefinition {
        &self.steps[self.current - 1]
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.current == self.steps.len()
    }

    /// Validate the current step without moving
    pub fn validate_current(&self, fields: &dyn FieldSource) -> ValidationOutcome {
        ValidationGate::validate(self.current_step(), fields)
    }

    /// Move forward one step if the current step validates.
    ///
    /// At the terminal step this is a no-op, so a repeated "finish" is harmless.
    pub fn advance(&mut self, fields: &dyn FieldSource) -> Result<StepTransition, WorkflowError> {
        if self.is_terminal() {
            return Ok(StepTransition::Stayed);
        }

        match self.validate_current(fields) {
            ValidationOutcome::Ok => {
                let from = self.current;
                self.current += 1;
                Ok(StepTransition::Advanced {
                    from,
                    to: self.current,
                })
            }
            ValidationOutcome::Failed { failed_fields } => Err(WorkflowError::ValidationFailed {
                step: self.current,
                failed_fields,
            }),
        }
    }

    /// Move back one step, floored at 1. Never validates.
    pub fn retreat(&mut self) -> StepTransition {
        if self.current <= 1 {
            return StepTransition::Stayed;
        }
        let from = self.current;
        self.current -= 1;
        StepTransition::Retreated {
            from,
            to: self.current,
        }
    }

    /// Trusted, unvalidated move. Out-of-range targets are clamped.
    pub fn jump_to(&mut self, step: usize) -> usize {
        self.current = step.clamp(1, self.steps.len());
        self.current
    }

    /// Swap in another track and position (mode changes)
    pub fn replace_steps(
        &mut self,
        steps: Vec<StepDefinition>,
        current: usize,
    ) -> Result<(), WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::EmptyTrack);
        }
        self.steps = steps;
        self.jump_to(current);
        Ok(())
    }

    pub fn progress(&self) -> StepProgress {
        let total = self.steps.len();
        StepProgress {
            current: self.current,
            total,
            current_title: self.current_step().title.clone(),
            titles: self.steps.iter().map(|s| s.title.clone()).collect(),
            percentage: ((self.current * 100) / total) as u8,
            is_terminal: self.is_terminal(),
        }
    }
}
