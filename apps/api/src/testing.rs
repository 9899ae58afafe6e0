//! Fixtures shared by the unit tests: an in-memory service graph, a mail
//! sender that records instead of sending, and row builders.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::email::{EmailError, EmailSender};
use crate::leads::interactions::InteractionWeights;
use crate::matching::recommend::MatchWeights;
use crate::models::agent::{Agent, AgentStatus};
use crate::models::booking::{Booking, BookingStatus};
use crate::models::lead::{Lead, LeadCapture};
use crate::models::property::{Property, Unit};
use crate::models::workflow::{
    EmailTemplate, MarketingWorkflow, TriggerType, WorkflowStatus, WorkflowTrigger,
};
use crate::state::Services;
use crate::store::memory::MemoryStore;
use crate::store::CrmStore;
use crate::tracking::TrackingLinks;

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<bool, EmailError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(true)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub email: Arc<RecordingEmailSender>,
    pub services: Services,
    pub tenant_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(RecordingEmailSender::default());
        let services = Services {
            store: store.clone(),
            email: email.clone(),
            links: TrackingLinks::new("http://localhost:8080"),
            weights: InteractionWeights::default(),
            match_weights: MatchWeights::default(),
            claim_lease: chrono::Duration::seconds(60),
            default_budget_ceiling: 10_000_000.0,
            auto_assign: true,
        };
        Self {
            store,
            email,
            services,
            tenant_id: Uuid::new_v4(),
        }
    }
}

/// A time on a fixed day, so ordering in tests reads as a clock.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
}

pub fn agent(
    tenant_id: Uuid,
    name: &str,
    last_lead_assigned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> Agent {
    Agent {
        id: Uuid::new_v4(),
        tenant_id,
        user_id: Uuid::new_v4(),
        name: Some(name.to_string()),
        email: Some(format!("{}@agents.example", name.to_lowercase())),
        specialization: None,
        commission_rate: 5.0,
        status: AgentStatus::Active,
        total_leads: 0,
        total_deals: 0,
        last_lead_assigned_at,
        created_at,
    }
}

/// Captures a named lead through the store, bypassing scoring.
pub async fn seed_lead(h: &Harness, email: &str) -> Lead {
    let capture = LeadCapture {
        name: Some("Seeded Lead".to_string()),
        email: Some(email.to_string()),
        ..Default::default()
    };
    h.store
        .capture_lead(h.tenant_id, &capture, at(8, 0))
        .await
        .unwrap()
        .into_inner()
}

pub fn property(
    tenant_id: Uuid,
    name: &str,
    city: &str,
    property_type: &str,
    created_at: DateTime<Utc>,
) -> Property {
    Property {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        city: Some(city.to_string()),
        property_type: Some(property_type.to_string()),
        is_active: true,
        created_at,
    }
}

pub fn unit(property_id: Uuid, price: Option<f64>, is_available: bool) -> Unit {
    Unit {
        id: Uuid::new_v4(),
        property_id,
        name: "Unit".to_string(),
        price,
        is_available,
    }
}

pub fn booking(tenant_id: Uuid, total_price: f64, status: BookingStatus) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        tenant_id,
        user_id: None,
        agent_id: None,
        unit_id: None,
        status,
        total_price,
        customer_email: None,
        customer_name: None,
        created_at: at(7, 0),
    }
}

pub fn template(tenant_id: Uuid, subject: &str, body_html: &str) -> EmailTemplate {
    EmailTemplate {
        id: Uuid::new_v4(),
        tenant_id,
        name: subject.to_string(),
        subject: subject.to_string(),
        body_html: body_html.to_string(),
    }
}

/// LEAD_CREATED workflow; `steps` is the raw JSON step tree.
pub fn workflow(tenant_id: Uuid, steps: Value, status: WorkflowStatus) -> MarketingWorkflow {
    MarketingWorkflow {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Nurture".to_string(),
        trigger: Json(WorkflowTrigger {
            trigger_type: TriggerType::LeadCreated,
        }),
        steps: Json(serde_json::from_value(steps).unwrap()),
        status,
        created_at: at(0, 0),
    }
}
