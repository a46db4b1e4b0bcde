//! Workflow session state
//!
//! A `WorkflowSession` is the resumable, in-progress state of one workflow module
//! for one user: where they are, which track they are on, what they typed
//! (`fields`) and what was generated for them (`extras`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::definition::WorkflowMode;

/// A single form value
///
/// The engine does not know the schema of any workflow; it only needs to tell
/// whether a value counts as "filled in".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Set(BTreeSet<String>),
}

impl FieldValue {
    /// Build a string-set value
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Set(items.into_iter().map(Into::into).collect())
    }

    /// Whether this value satisfies a required field.
    ///
    /// Empty and whitespace-only text, empty sets and null are unsatisfied.
    /// Booleans are opt-in flags, so `false` still counts as answered.
    pub fn is_satisfied(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(_) => true,
            FieldValue::Number(n) => !n.is_nan(),
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Set(items) => !items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Set(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// User-entered form input, keyed by field name
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Derived or generated content (summaries, result sets), keyed by a stable name
pub type ExtrasMap = BTreeMap<String, serde_json::Value>;

/// Read access to a record of field values.
///
/// The validation gate and the mode router only ever look at fields through
/// this trait, so an untyped `FieldMap` and a typed per-module record are
/// interchangeable.
pub trait FieldSource {
    /// Current value of a field, if the record has one
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Whether the field is present and non-empty
    fn has(&self, name: &str) -> bool {
        self.field(name)
            .map(|value| value.is_satisfied())
            .unwrap_or(false)
    }

    /// Whether a boolean flag is switched on
    fn is_set(&self, name: &str) -> bool {
        matches!(self.field(name), Some(FieldValue::Bool(true)))
    }
}

impl FieldSource for FieldMap {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.get(name).map(FieldValue::is_satisfied).unwrap_or(false)
    }
}

/// Build a `FieldMap` from `(name, value)` pairs
pub fn field_map<I, K, V>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Resumable state of one workflow module for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSession {
    /// Workflow type identifier (e.g. "briefing-quick")
    pub module_key: String,
    /// 1-indexed position within the active track
    pub current_step: usize,
    /// Active track
    pub mode: WorkflowMode,
    /// User-entered values
    pub fields: FieldMap,
    /// Generated content, kept apart from user input
    #[serde(default)]
    pub extras: ExtrasMap,
    /// Label of the upstream source this session was seeded from, if any
    #[serde(default)]
    pub seeded_from: Option<String>,
    /// Write counter used for versioned writes
    #[serde(default)]
    pub revision: u64,
    /// Last write time (display only)
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSession {
    /// Create an empty session at step 1
    pub fn new(module_key: &str, mode: WorkflowMode) -> Self {
        Self {
            module_key: module_key.to_string(),
            current_step: 1,
            mode,
            fields: FieldMap::new(),
            extras: ExtrasMap::new(),
            seeded_from: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Shallow-merge field values; unspecified fields are kept
    pub fn merge_fields(&mut self, partial: FieldMap) {
        self.fields.extend(partial);
        self.touch();
    }

    /// Shallow-merge extras; unspecified extras are kept
    pub fn merge_extras(&mut self, partial: ExtrasMap) {
        self.extras.extend(partial);
        self.touch();
    }

    /// Remove named extras without touching fields
    pub fn remove_extras(&mut self, names: &[&str]) {
        for name in names {
            self.extras.remove(*name);
        }
        self.touch();
    }

    /// Whether the user has entered anything yet
    pub fn has_input(&self) -> bool {
        self.fields.values().any(FieldValue::is_satisfied)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
