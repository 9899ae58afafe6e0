use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

pub const FALLBACK_DISPLAY_NAME: &str = "Valued Client";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "lead_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "lead_priority", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "lead_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LeadSource {
    #[default]
    Website,
    Phone,
    Email,
    Referral,
    Social,
    Other,
    Chatbot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "interaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    EmailOpen,
    EmailClick,
    PropertyView,
    FormSubmit,
    ChatInit,
    BookingRequest,
    UnitView,
    EmailSent,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::EmailOpen => "EMAIL_OPEN",
            InteractionType::EmailClick => "EMAIL_CLICK",
            InteractionType::PropertyView => "PROPERTY_VIEW",
            InteractionType::FormSubmit => "FORM_SUBMIT",
            InteractionType::ChatInit => "CHAT_INIT",
            InteractionType::BookingRequest => "BOOKING_REQUEST",
            InteractionType::UnitView => "UNIT_VIEW",
            InteractionType::EmailSent => "EMAIL_SENT",
        }
    }
}

/// A prospective customer. Deduplicated per tenant by email or phone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub source: LeadSource,
    pub lead_score: i32,
    pub budget: Option<f64>,
    pub preferences: Value,
    pub tags: Option<String>,
    pub property_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }

    pub fn tag_list(&self) -> Vec<String> {
        split_tags(self.tags.as_deref())
    }
}

pub fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Immutable event log entry. The weight is frozen at insert time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeadInteraction {
    pub id: Uuid,
    pub lead_id: Uuid,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    pub score_weight: i32,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

/// Inbound capture from a public form, widget, or staff entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCapture {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub priority: LeadPriority,
    pub message: Option<String>,
    pub budget: Option<f64>,
    pub property_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    /// Owning customer account. Taken from the authenticated caller, never
    /// from the request body.
    #[serde(skip)]
    pub user_id: Option<Uuid>,
}

impl LeadCapture {
    /// Trims identity fields and lowercases the email. Blank values become `None`.
    pub fn normalized(mut self) -> Self {
        self.name = non_blank(self.name);
        self.email = non_blank(self.email).map(|e| e.to_lowercase());
        self.phone = non_blank(self.phone);
        self.message = non_blank(self.message);
        self.budget = self.budget.filter(|b| b.is_finite() && *b > 0.0);
        self
    }

    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }

    pub fn into_new_lead(self, tenant_id: Uuid, now: DateTime<Utc>) -> Lead {
        let notes = self.message.as_deref().map(|m| note_line(now, m));
        Lead {
            id: Uuid::new_v4(),
            tenant_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            status: LeadStatus::New,
            priority: self.priority,
            source: self.source,
            lead_score: 0,
            budget: self.budget,
            preferences: Value::Object(Default::default()),
            tags: None,
            property_id: self.property_id,
            unit_id: self.unit_id,
            user_id: self.user_id,
            notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Folds a repeat capture into the existing lead: notes are appended, empty
/// identity fields are filled, and nothing already known is overwritten.
pub fn apply_recapture(existing: &Lead, capture: &LeadCapture, now: DateTime<Utc>) -> Lead {
    let mut lead = existing.clone();
    if lead.name.is_none() {
        lead.name = capture.name.clone();
    }
    if lead.email.is_none() {
        lead.email = capture.email.clone();
    }
    if lead.phone.is_none() {
        lead.phone = capture.phone.clone();
    }
    if lead.user_id.is_none() {
        lead.user_id = capture.user_id;
    }
    if capture.property_id.is_some() {
        lead.property_id = capture.property_id;
    }
    if capture.unit_id.is_some() {
        lead.unit_id = capture.unit_id;
    }
    if let Some(budget) = capture.budget {
        lead.budget = Some(budget);
    }

    let message = capture
        .message
        .as_deref()
        .unwrap_or("Re-engaged via capture form");
    let line = note_line(now, message);
    lead.notes = Some(match lead.notes.as_deref() {
        Some(prev) if !prev.is_empty() => format!("{prev}\n{line}"),
        _ => line,
    });
    lead.updated_at = now;
    lead
}

fn note_line(now: DateTime<Utc>, message: &str) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d %H:%M"), message)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
