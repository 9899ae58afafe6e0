use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "agent_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Inactive,
    OnLeave,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "assignment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "commission_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
}

/// Staff member with a commission profile. `name`/`email` come from the linked user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<String>,
    /// Percentage, e.g. `5.0` for 5%.
    pub commission_rate: f64,
    pub status: AgentStatus,
    pub total_leads: i32,
    pub total_deals: i32,
    pub last_lead_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Agent-to-lead junction row. History is kept; only one row per lead is ACTIVE.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AgentLead {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub lead_id: Uuid,
    pub is_primary: bool,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub booking_id: Uuid,
    pub amount: f64,
    /// Agent rate at computation time; later rate changes never touch this row.
    pub rate_snapshot: f64,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub booking_id: Uuid,
    pub amount: f64,
    pub rate_snapshot: f64,
}
