//! Storage boundary for the lead engine.
//!
//! Every operation that must be atomic (score + interaction, assignment +
//! agent counters, commission + deal counter, enrollment claims) is a single
//! method here so each backend can wrap it in one transaction or critical
//! section. Carried in `Services` as `Arc<dyn CrmStore>`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::agent::{Agent, AgentLead, Commission, NewCommission};
use crate::models::booking::Booking;
use crate::models::campaign::CampaignCounter;
use crate::models::lead::{InteractionType, Lead, LeadCapture, LeadInteraction, LeadStatus};
use crate::models::property::PropertyWithUnits;
use crate::models::workflow::{
    EmailTemplate, MarketingWorkflow, NewWorkflowLog, TriggerType, WorkflowEnrollment,
    WorkflowLog,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    MissingRow(&'static str),
}

/// Result of an insert guarded by a uniqueness rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<T> {
    Created(T),
    Existing(T),
}

impl<T> Insert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Insert::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Insert::Created(v) | Insert::Existing(v) => v,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Insert::Created(v) | Insert::Existing(v) => v,
        }
    }
}

/// Filter for recommendation candidates. Empty `cities` and `property_types`
/// means no preference filter; values are compared lowercase.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub tenant_id: Uuid,
    pub cities: Vec<String>,
    pub property_types: Vec<String>,
    pub max_price: f64,
    pub limit: i64,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    // ── leads ──────────────────────────────────────────────────────────────
    async fn find_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// Most recently created lead in the tenant with this (lowercase) email.
    async fn find_latest_lead_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, StoreError>;

    /// Creates a lead or folds the capture into the tenant's existing lead
    /// with the same email or phone. Serialised per tenant.
    async fn capture_lead(
        &self,
        tenant_id: Uuid,
        capture: &LeadCapture,
        now: DateTime<Utc>,
    ) -> Result<Insert<Lead>, StoreError>;

    async fn update_lead_status(
        &self,
        lead_id: Uuid,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError>;

    async fn update_lead_preferences(
        &self,
        lead_id: Uuid,
        preferences: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_lead_tags(
        &self,
        lead_id: Uuid,
        tags: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ── interactions ───────────────────────────────────────────────────────
    /// Inserts the interaction and adds `weight` to the lead score atomically.
    /// Returns the new score.
    async fn record_interaction(
        &self,
        lead_id: Uuid,
        interaction_type: InteractionType,
        weight: i32,
        metadata: &Value,
        now: DateTime<Utc>,
    ) -> Result<(LeadInteraction, i32), StoreError>;

    async fn interactions_for_lead(&self, lead_id: Uuid)
        -> Result<Vec<LeadInteraction>, StoreError>;

    /// Newest-first interactions of the given types whose metadata carries a `propertyId`.
    async fn recent_property_interactions(
        &self,
        lead_id: Uuid,
        types: &[InteractionType],
        limit: i64,
    ) -> Result<Vec<LeadInteraction>, StoreError>;

    /// Returns false when the campaign does not exist in the tenant.
    async fn increment_campaign_counter(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        counter: CampaignCounter,
    ) -> Result<bool, StoreError>;

    // ── agents ─────────────────────────────────────────────────────────────
    async fn find_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, StoreError>;

    /// ACTIVE agents, never-assigned first, then oldest assignment, then oldest agent.
    async fn active_agents_by_rotation(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError>;

    async fn active_assignment(&self, lead_id: Uuid) -> Result<Option<AgentLead>, StoreError>;

    async fn assignment_history(&self, lead_id: Uuid) -> Result<Vec<AgentLead>, StoreError>;

    /// Inserts an ACTIVE primary assignment unless the lead already has one.
    /// With `rotate`, also stamps `last_lead_assigned_at` and bumps `total_leads`
    /// in the same transaction.
    async fn insert_assignment(
        &self,
        agent_id: Uuid,
        lead_id: Uuid,
        rotate: bool,
        now: DateTime<Utc>,
    ) -> Result<Insert<AgentLead>, StoreError>;

    /// Deactivates every active assignment of the lead, then links `agent_id` if given.
    async fn reassign_lead(
        &self,
        lead_id: Uuid,
        agent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<AgentLead>, StoreError>;

    // ── bookings & commissions ─────────────────────────────────────────────
    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn latest_lead_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Lead>, StoreError>;

    /// Agent actively assigned to the newest lead with this email that has one.
    async fn latest_agent_for_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError>;

    /// Inserts at most one commission per booking; bumps the agent's `total_deals`
    /// in the same transaction when a row is created.
    async fn insert_commission(
        &self,
        commission: &NewCommission,
        now: DateTime<Utc>,
    ) -> Result<Insert<Commission>, StoreError>;

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<Commission>, StoreError>;

    // ── properties ─────────────────────────────────────────────────────────
    /// Properties with all their units, in the order of `property_ids`.
    async fn properties_with_units(
        &self,
        property_ids: &[Uuid],
    ) -> Result<Vec<PropertyWithUnits>, StoreError>;

    /// Active properties with at least one available unit priced within budget.
    /// Units attached are the available ones.
    async fn candidate_properties(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<PropertyWithUnits>, StoreError>;

    // ── workflows ──────────────────────────────────────────────────────────
    async fn find_workflow(&self, workflow_id: Uuid)
        -> Result<Option<MarketingWorkflow>, StoreError>;

    async fn active_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger: &TriggerType,
    ) -> Result<Vec<MarketingWorkflow>, StoreError>;

    async fn find_template(&self, template_id: Uuid)
        -> Result<Option<EmailTemplate>, StoreError>;

    /// Enrolls once per (workflow, lead). `first_step = None` enrolls as COMPLETED.
    async fn enroll(
        &self,
        workflow_id: Uuid,
        lead_id: Uuid,
        first_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Insert<WorkflowEnrollment>, StoreError>;

    async fn find_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<WorkflowEnrollment>, StoreError>;

    async fn due_enrollments(&self, now: DateTime<Utc>)
        -> Result<Vec<WorkflowEnrollment>, StoreError>;

    /// Compare-and-swap on `version`: takes the enrollment for this tick and
    /// pushes `next_action_at` to `lease_until`. `None` when another tick won.
    async fn claim_enrollment(
        &self,
        enrollment: &WorkflowEnrollment,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<WorkflowEnrollment>, StoreError>;

    /// Compare-and-swap on the claimed `version`. `next_step = None` completes.
    async fn advance_enrollment(
        &self,
        claimed: &WorkflowEnrollment,
        next_step: Option<&str>,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn write_workflow_log(
        &self,
        log: &NewWorkflowLog,
        now: DateTime<Utc>,
    ) -> Result<WorkflowLog, StoreError>;

    async fn workflow_logs(&self, enrollment_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError>;
}
