//! Built-in workflow modules
//!
//! Each module has a concrete field record. The records implement
//! [`FieldSource`], which is all the engine needs from them; drafts still store
//! the open `FieldMap` form so older drafts keep loading when a record grows.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::definition::{StepDefinition, WorkflowDefinition, WorkflowMode};
use super::errors::WorkflowError;
use super::session::{FieldMap, FieldSource, FieldValue};
use super::validation::Requirement;
use crate::activity::ActivityType;

/// Conversion between a typed record and the stored field map
pub trait TypedFields: Serialize + DeserializeOwned + FieldSource {
    fn from_fields(fields: &FieldMap) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(fields)?;
        serde_json::from_value(value)
    }

    /// Field map of the present values only
    fn to_fields(&self) -> Result<FieldMap, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        let map: FieldMap = serde_json::from_value(value)?;
        Ok(map
            .into_iter()
            .filter(|(_, v)| *v != FieldValue::Null)
            .collect())
    }
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value.as_ref().map(|s| FieldValue::Text(s.clone()))
}

fn number(value: &Option<f64>) -> Option<FieldValue> {
    value.map(FieldValue::Number)
}

fn set(value: &BTreeSet<String>) -> Option<FieldValue> {
    Some(FieldValue::Set(value.clone()))
}

/// Short intake capturing a lead
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuickBriefingFields {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub main_need: Option<String>,
}

impl FieldSource for QuickBriefingFields {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "companyName" => text(&self.company_name),
            "contactName" => text(&self.contact_name),
            "contactEmail" => text(&self.contact_email),
            "mainNeed" => text(&self.main_need),
            _ => None,
        }
    }
}

impl TypedFields for QuickBriefingFields {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BriefingFields {
    pub client_id: Option<String>,
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub segment: Option<String>,
    pub target_audience: Option<String>,
    pub goals: Option<String>,
    pub budget: Option<f64>,
    pub channels: BTreeSet<String>,
    pub main_need: Option<String>,
}

impl FieldSource for BriefingFields {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "clientId" => text(&self.client_id),
            "companyName" => text(&self.company_name),
            "contactName" => text(&self.contact_name),
            "segment" => text(&self.segment),
            "targetAudience" => text(&self.target_audience),
            "goals" => text(&self.goals),
            "budget" => number(&self.budget),
            "channels" => set(&self.channels),
            "mainNeed" => text(&self.main_need),
            _ => None,
        }
    }
}

impl TypedFields for BriefingFields {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosisFields {
    /// Create the client inline instead of picking an existing one
    pub create_new_client: bool,
    pub new_client_name: Option<String>,
    pub client_id: Option<String>,
    pub business_context: Option<String>,
    pub challenges: BTreeSet<String>,
    pub maturity_level: Option<String>,
    pub channels: BTreeSet<String>,
}

impl FieldSource for DiagnosisFields {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "createNewClient" => Some(FieldValue::Bool(self.create_new_client)),
            "newClientName" => text(&self.new_client_name),
            "clientId" => text(&self.client_id),
            "businessContext" => text(&self.business_context),
            "challenges" => set(&self.challenges),
            "maturityLevel" => text(&self.maturity_level),
            "channels" => set(&self.channels),
            _ => None,
        }
    }
}

impl TypedFields for DiagnosisFields {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchKitFields {
    pub client_id: Option<String>,
    pub offer_name: Option<String>,
    pub channels: BTreeSet<String>,
    pub budget: Option<f64>,
    pub include_landing_page: bool,
}

impl FieldSource for LaunchKitFields {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "clientId" => text(&self.client_id),
            "offerName" => text(&self.offer_name),
            "channels" => set(&self.channels),
            "budget" => number(&self.budget),
            "includeLandingPage" => Some(FieldValue::Bool(self.include_landing_page)),
            _ => None,
        }
    }
}

impl TypedFields for LaunchKitFields {}

/// The built-in workflow modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowModule {
    #[serde(rename = "briefing-quick")]
    QuickBriefing,
    #[serde(rename = "briefing")]
    Briefing,
    #[serde(rename = "diagnosis")]
    Diagnosis,
    #[serde(rename = "launch-kit")]
    LaunchKit,
}

impl WorkflowModule {
    pub fn all() -> &'static [WorkflowModule] {
        &[
            WorkflowModule::QuickBriefing,
            WorkflowModule::Briefing,
            WorkflowModule::Diagnosis,
            WorkflowModule::LaunchKit,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            WorkflowModule::QuickBriefing => "briefing-quick",
            WorkflowModule::Briefing => "briefing",
            WorkflowModule::Diagnosis => "diagnosis",
            WorkflowModule::LaunchKit => "launch-kit",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, WorkflowError> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.key() == key)
            .ok_or_else(|| WorkflowError::UnknownModule(key.to_string()))
    }

    /// Downstream module a finished run of this one can seed, and in which mode
    pub fn handoff_target(&self) -> Option<(WorkflowModule, WorkflowMode)> {
        match self {
            WorkflowModule::QuickBriefing => {
                Some((WorkflowModule::Briefing, WorkflowMode::Complete))
            }
            _ => None,
        }
    }

    pub fn definition(&self) -> Arc<WorkflowDefinition> {
        Arc::new(match self {
            WorkflowModule::QuickBriefing => quick_briefing(),
            WorkflowModule::Briefing => briefing(),
            WorkflowModule::Diagnosis => diagnosis(),
            WorkflowModule::LaunchKit => launch_kit(),
        })
    }
}

impl fmt::Display for WorkflowModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn quick_briefing() -> WorkflowDefinition {
    WorkflowDefinition::new("briefing-quick", "Quick briefing", ActivityType::ClientCreated)
        .with_track(
            WorkflowMode::Simple,
            vec![
                StepDefinition::new("Company").requires(&["companyName"]),
                StepDefinition::new("Contact").requires(&["contactName"]),
                StepDefinition::new("Main need").requires(&["mainNeed"]),
                StepDefinition::new("Review"),
            ],
        )
}

fn briefing() -> WorkflowDefinition {
    WorkflowDefinition::new("briefing", "Briefing", ActivityType::BriefingCompleted)
        .with_track(
            WorkflowMode::Simple,
            vec![
                StepDefinition::new("Company").requires(&["companyName"]),
                StepDefinition::new("Goals").requires(&["goals"]),
                StepDefinition::new("Review"),
            ],
        )
        .with_track(
            WorkflowMode::Complete,
            vec![
                StepDefinition::new("Company")
                    .requires(&["companyName"])
                    .skippable(),
                StepDefinition::new("Segment").requires(&["segment"]).skippable(),
                StepDefinition::new("Audience").requires(&["targetAudience"]),
                StepDefinition::new("Goals")
                    .requires(&["goals"])
                    .with_requirement(positive_budget()),
                StepDefinition::new("Review"),
            ],
        )
}

fn diagnosis() -> WorkflowDefinition {
    let client_step = StepDefinition::new("Client")
        .with_requirement(Requirement::when(
            "new client created inline",
            |f| f.is_set("createNewClient"),
            &["newClientName"],
        ))
        .with_requirement(Requirement::when(
            "existing client selected",
            |f| !f.is_set("createNewClient"),
            &["clientId"],
        ));

    WorkflowDefinition::new("diagnosis", "Diagnosis", ActivityType::DiagnosisCreated)
        .with_generation_event(ActivityType::IaDiagnosisGenerated)
        .with_track(
            WorkflowMode::Simple,
            vec![
                client_step.clone(),
                StepDefinition::new("Context").requires(&["businessContext", "challenges"]),
                StepDefinition::new("Review"),
            ],
        )
        .with_track(
            WorkflowMode::Complete,
            vec![
                client_step,
                StepDefinition::new("Context").requires(&["businessContext", "challenges"]),
                StepDefinition::new("Maturity").requires(&["maturityLevel", "channels"]),
                StepDefinition::new("Review"),
            ],
        )
}

fn launch_kit() -> WorkflowDefinition {
    WorkflowDefinition::new("launch-kit", "Launch kit", ActivityType::LaunchKitCreated)
        .with_generation_event(ActivityType::ProposalGenerated)
        .with_track(
            WorkflowMode::Simple,
            vec![
                StepDefinition::new("Client").requires(&["clientId"]).skippable(),
                StepDefinition::new("Offer").requires(&["offerName"]),
                StepDefinition::new("Review"),
            ],
        )
        .with_track(
            WorkflowMode::Complete,
            vec![
                StepDefinition::new("Client").requires(&["clientId"]).skippable(),
                StepDefinition::new("Offer").requires(&["offerName"]),
                StepDefinition::new("Channels").requires(&["channels"]),
                StepDefinition::new("Budget").with_requirement(positive_budget()),
                StepDefinition::new("Review"),
            ],
        )
}

/// Budget is optional, but when given it must be positive
fn positive_budget() -> Requirement {
    Requirement::predicate("budget must be positive", &["budget"], |f| {
        match f.field("budget") {
            Some(FieldValue::Number(n)) if n <= 0.0 || n.is_nan() => vec!["budget".to_string()],
            Some(FieldValue::Text(_)) => vec!["budget".to_string()],
            _ => Vec::new(),
        }
    })
}
