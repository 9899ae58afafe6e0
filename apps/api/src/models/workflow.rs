use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::workflows::steps::WorkflowStep;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "workflow_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "enrollment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    LeadCreated,
    FormSubmitted,
    Manual,
    Other(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::LeadCreated => "LEAD_CREATED",
            TriggerType::FormSubmitted => "FORM_SUBMITTED",
            TriggerType::Manual => "MANUAL",
            TriggerType::Other(raw) => raw,
        }
    }
}

impl From<String> for TriggerType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LEAD_CREATED" => TriggerType::LeadCreated,
            "FORM_SUBMITTED" => TriggerType::FormSubmitted,
            "MANUAL" => TriggerType::Manual,
            _ => TriggerType::Other(raw),
        }
    }
}

impl From<TriggerType> for String {
    fn from(trigger: TriggerType) -> Self {
        trigger.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
}

/// Automation definition. `steps` is a tree: CONDITION steps nest branches.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarketingWorkflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger: Json<WorkflowTrigger>,
    pub steps: Json<Vec<WorkflowStep>>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

/// One lead's run through one workflow. Unique per (workflow, lead).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEnrollment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Uuid,
    pub current_step: Option<String>,
    pub status: EnrollmentStatus,
    pub next_action_at: Option<DateTime<Utc>>,
    /// Bumped on every claim and advance; guards concurrent ticks.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLog {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub step_id: String,
    pub action_type: String,
    pub status: String,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkflowLog {
    pub enrollment_id: Uuid,
    pub step_id: String,
    pub action_type: String,
    pub status: String,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body_html: String,
}
