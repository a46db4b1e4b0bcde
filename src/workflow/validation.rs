//! Per-step validation
//!
//! A step declares a list of [`Requirement`]s. The gate evaluates only the step
//! being left and reports every field that blocks it, in declaration order.

use std::fmt;
use std::sync::Arc;

use super::definition::StepDefinition;
use super::session::FieldSource;

/// Condition deciding whether a conditional requirement applies
pub type Condition = Arc<dyn Fn(&dyn FieldSource) -> bool + Send + Sync>;

/// Arbitrary check returning the names of the fields it rejects
pub type Check = Arc<dyn Fn(&dyn FieldSource) -> Vec<String> + Send + Sync>;

/// One thing a step needs before the user may leave it
#[derive(Clone)]
pub enum Requirement {
    /// The field must be present and non-empty
    Field(String),
    /// The fields are required only while the condition holds
    When {
        label: String,
        condition: Condition,
        fields: Vec<String>,
    },
    /// Custom check over the whole record; `fields` lists what it may report
    Predicate {
        label: String,
        fields: Vec<String>,
        check: Check,
    },
}

impl Requirement {
    pub fn field(name: &str) -> Self {
        Requirement::Field(name.to_string())
    }

    /// Require `fields` only when `condition` holds
    pub fn when<F>(label: &str, condition: F, fields: &[&str]) -> Self
    where
        F: Fn(&dyn FieldSource) -> bool + Send + Sync + 'static,
    {
        Requirement::When {
            label: label.to_string(),
            condition: Arc::new(condition),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn predicate<F>(label: &str, fields: &[&str], check: F) -> Self
    where
        F: Fn(&dyn FieldSource) -> Vec<String> + Send + Sync + 'static,
    {
        Requirement::Predicate {
            label: label.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            check: Arc::new(check),
        }
    }

    /// Field names this requirement can report as failed
    pub fn field_names(&self) -> Vec<String> {
        match self {
            Requirement::Field(name) => vec![name.clone()],
            Requirement::When { fields, .. } | Requirement::Predicate { fields, .. } => {
                fields.clone()
            }
        }
    }

    /// Evaluate against a record, returning the failing field names
    pub fn failures(&self, source: &dyn FieldSource) -> Vec<String> {
        match self {
            Requirement::Field(name) => {
                if source.has(name) {
                    Vec::new()
                } else {
                    vec![name.clone()]
                }
            }
            Requirement::When {
                condition, fields, ..
            } => {
                if !condition(source) {
                    return Vec::new();
                }
                fields
                    .iter()
                    .filter(|name| !source.has(name))
                    .cloned()
                    .collect()
            }
            Requirement::Predicate { check, .. } => check(source),
        }
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Requirement::When { label, fields, .. } => f
                .debug_struct("When")
                .field("label", label)
                .field("fields", fields)
                .finish_non_exhaustive(),
            Requirement::Predicate { label, fields, .. } => f
                .debug_struct("Predicate")
                .field("label", label)
                .field("fields", fields)
                .finish_non_exhaustive(),
        }
    }
}

/// Result of validating one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Ok,
    Failed { failed_fields: Vec<String> },
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationOutcome::Ok)
    }

    pub fn failed_fields(&self) -> &[String] {
        match self {
            ValidationOutcome::Ok => &[],
            ValidationOutcome::Failed { failed_fields } => failed_fields,
        }
    }
}

/// Evaluates a step's requirements against the current field values
pub struct ValidationGate;

impl ValidationGate {
    /// Validate the given step. Never looks at any other step.
    pub fn validate(step: &StepDefinition, source: &dyn FieldSource) -> ValidationOutcome {
        let mut failed: Vec<String> = Vec::new();
        for requirement in &step.requirements {
            for name in requirement.failures(source) {
                if !failed.contains(&name) {
                    failed.push(name);
                }
            }
        }

        if failed.is_empty() {
            ValidationOutcome::Ok
        } else {
            log::debug!(
                "Step {} ({}) failed validation: {:?}",
                step.id,
                step.title,
                failed
            );
            ValidationOutcome::Failed {
                failed_fields: failed,
            }
        }
    }

    /// Whether the step is fully satisfied
    pub fn is_satisfied(step: &StepDefinition, source: &dyn FieldSource) -> bool {
        Self::validate(step, source).is_ok()
    }
}
