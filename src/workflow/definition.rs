//! Static workflow definitions
//!
//! A workflow module declares one ordered step list ("track") per operating mode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::validation::Requirement;
use crate::activity::ActivityType;

/// Operating track of a workflow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Short track with only the essential steps
    Simple,
    /// Full track
    Complete,
}

impl WorkflowMode {
    /// Get all modes
    pub fn all() -> &'static [WorkflowMode] {
        &[WorkflowMode::Simple, WorkflowMode::Complete]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::Simple => "simple",
            WorkflowMode::Complete => "complete",
        }
    }

    /// Get the display name for this mode
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkflowMode::Simple => "Simple",
            WorkflowMode::Complete => "Complete",
        }
    }

    /// Parse from the serialized name
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "simple" => Some(WorkflowMode::Simple),
            "complete" | "advanced" => Some(WorkflowMode::Complete),
            _ => None,
        }
    }
}

impl Default for WorkflowMode {
    fn default() -> Self {
        WorkflowMode::Simple
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a track
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// 1-indexed position within its track
    pub id: usize,
    pub title: String,
    /// What the validation gate checks before leaving this step
    pub requirements: Vec<Requirement>,
    /// May be bypassed when its data already came from an upstream source
    pub skippable: bool,
}

impl StepDefinition {
    /// Create a step; the id is assigned when the track is built
    pub fn new(title: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            requirements: Vec::new(),
            skippable: false,
        }
    }

    /// Require plain fields
    pub fn requires(mut self, fields: &[&str]) -> Self {
        self.requirements
            .extend(fields.iter().map(|f| Requirement::field(f)));
        self
    }

    /// Add an arbitrary requirement
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Allow the step to be skipped when already satisfied
    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    /// Names of every field this step can report as failed
    pub fn required_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for requirement in &self.requirements {
            for name in requirement.field_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Static description of one workflow module
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub module_key: String,
    pub title: String,
    tracks: BTreeMap<WorkflowMode, Vec<StepDefinition>>,
    /// Milestone recorded when the workflow's record is created
    pub completion_event: ActivityType,
    /// Milestone recorded when content generation succeeds, if any
    pub generation_event: Option<ActivityType>,
}

impl WorkflowDefinition {
    pub fn new(module_key: &str, title: &str, completion_event: ActivityType) -> Self {
        Self {
            module_key: module_key.to_string(),
            title: title.to_string(),
            tracks: BTreeMap::new(),
            completion_event,
            generation_event: None,
        }
    }

    /// Declare the steps for a mode; ids are assigned from position
    pub fn with_track(mut self, mode: WorkflowMode, steps: Vec<StepDefinition>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(idx, mut step)| {
                step.id = idx + 1;
                step
            })
            .collect();
        self.tracks.insert(mode, steps);
        self
    }

    pub fn with_generation_event(mut self, event: ActivityType) -> Self {
        self.generation_event = Some(event);
        self
    }

    /// Steps for a mode, if the module supports it
    pub fn track(&self, mode: WorkflowMode) -> Option<&[StepDefinition]> {
        self.tracks.get(&mode).map(Vec::as_slice)
    }

    /// Modes this module supports
    pub fn modes(&self) -> Vec<WorkflowMode> {
        self.tracks.keys().copied().collect()
    }

    pub fn supports(&self, mode: WorkflowMode) -> bool {
        self.tracks.contains_key(&mode)
    }

    /// Number of steps in a mode's track (0 when unsupported)
    pub fn step_count(&self, mode: WorkflowMode) -> usize {
        self.tracks.get(&mode).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition::new("sample", "Sample", ActivityType::PlanCreated)
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
                    StepDefinition::new("Goals").requires(&["goals", "budget"]),
                    StepDefinition::new("Review"),
                ],
            )
    }

    #[test]
    fn test_track_ids_follow_position() {
        let def = sample();
        let steps = def.track(WorkflowMode::Complete).unwrap();
        let ids: Vec<usize> = steps.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(steps[0].skippable);
        assert!(!steps[1].skippable);
    }

    #[test]
    fn test_step_counts() {
        let def = sample();
        assert_eq!(def.step_count(WorkflowMode::Simple), 2);
        assert_eq!(def.step_count(WorkflowMode::Complete), 4);
        assert_eq!(def.modes(), vec![WorkflowMode::Simple, WorkflowMode::Complete]);
    }

    #[test]
    fn test_unsupported_mode() {
        let def = WorkflowDefinition::new("only-simple", "Only", ActivityType::PlanCreated)
            .with_track(WorkflowMode::Simple, vec![StepDefinition::new("One")]);
        assert!(!def.supports(WorkflowMode::Complete));
        assert!(def.track(WorkflowMode::Complete).is_none());
        assert_eq!(def.step_count(WorkflowMode::Complete), 0);
    }

    #[test]
    fn test_required_field_names_are_unique() {
        let step = StepDefinition::new("Goals")
            .requires(&["goals", "budget"])
            .requires(&["goals"]);
        assert_eq!(step.required_field_names(), vec!["goals", "budget"]);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(WorkflowMode::parse("simple"), Some(WorkflowMode::Simple));
        assert_eq!(WorkflowMode::parse(" Complete "), Some(WorkflowMode::Complete));
        assert_eq!(WorkflowMode::parse("advanced"), Some(WorkflowMode::Complete));
        assert_eq!(WorkflowMode::parse("other"), None);
        assert_eq!(WorkflowMode::default(), WorkflowMode::Simple);
    }
}
