use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::agent::{
    Agent, AgentLead, AgentStatus, AssignmentStatus, Commission, CommissionStatus, NewCommission,
};
use crate::models::booking::Booking;
use crate::models::campaign::{Campaign, CampaignCounter};
use crate::models::lead::{
    apply_recapture, InteractionType, Lead, LeadCapture, LeadInteraction, LeadStatus,
};
use crate::models::property::{attach_units, Property, PropertyWithUnits, Unit};
use crate::models::workflow::{
    EmailTemplate, EnrollmentStatus, MarketingWorkflow, NewWorkflowLog, TriggerType,
    WorkflowEnrollment, WorkflowLog, WorkflowStatus,
};
use crate::store::{CandidateQuery, CrmStore, Insert, StoreError};

#[derive(Default)]
struct Tables {
    leads: Vec<Lead>,
    interactions: Vec<LeadInteraction>,
    campaigns: Vec<Campaign>,
    agents: Vec<Agent>,
    agent_leads: Vec<AgentLead>,
    bookings: Vec<Booking>,
    commissions: Vec<Commission>,
    properties: Vec<Property>,
    units: Vec<Unit>,
    workflows: Vec<MarketingWorkflow>,
    templates: Vec<EmailTemplate>,
    enrollments: Vec<WorkflowEnrollment>,
    logs: Vec<WorkflowLog>,
}

impl Tables {
    fn lead_mut(&mut self, lead_id: Uuid) -> Result<&mut Lead, StoreError> {
        self.leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or(StoreError::MissingRow("lead"))
    }

    fn active_assignment(&self, lead_id: Uuid) -> Option<&AgentLead> {
        self.agent_leads
            .iter()
            .find(|a| a.lead_id == lead_id && a.status == AssignmentStatus::Active)
    }

    fn new_assignment(&mut self, agent_id: Uuid, lead_id: Uuid, now: DateTime<Utc>) -> AgentLead {
        let row = AgentLead {
            id: Uuid::new_v4(),
            agent_id,
            lead_id,
            is_primary: true,
            status: AssignmentStatus::Active,
            assigned_at: now,
        };
        self.agent_leads.push(row.clone());
        row
    }
}

/// Process-local store. One mutex guards every table, so each trait method
/// is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn find_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.leads.iter().find(|l| l.id == lead_id).cloned())
    }

    async fn find_latest_lead_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.leads
            .iter()
            .filter(|l| {
                l.tenant_id == tenant_id
                    && l.email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn capture_lead(
        &self,
        tenant_id: Uuid,
        capture: &LeadCapture,
        now: DateTime<Utc>,
    ) -> Result<Insert<Lead>, StoreError> {
        let mut t = self.tables.lock().await;

        let matches = |lead: &Lead| {
            lead.tenant_id == tenant_id
                && ((capture.email.is_some() && lead.email == capture.email)
                    || (capture.phone.is_some() && lead.phone == capture.phone))
        };
        let existing = t
            .leads
            .iter()
            .filter(|l| matches(l))
            .max_by_key(|l| l.created_at)
            .map(|l| l.id);

        match existing {
            Some(id) => {
                let lead = t.lead_mut(id)?;
                *lead = apply_recapture(lead, capture, now);
                Ok(Insert::Existing(lead.clone()))
            }
            None => {
                let lead = capture.clone().into_new_lead(tenant_id, now);
                t.leads.push(lead.clone());
                Ok(Insert::Created(lead))
            }
        }
    }

    async fn update_lead_status(
        &self,
        lead_id: Uuid,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.leads.iter_mut().find(|l| l.id == lead_id).map(|lead| {
            lead.status = status;
            lead.updated_at = now;
            lead.clone()
        }))
    }

    async fn update_lead_preferences(
        &self,
        lead_id: Uuid,
        preferences: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let lead = t.lead_mut(lead_id)?;
        lead.preferences = preferences.clone();
        lead.updated_at = now;
        Ok(())
    }

    async fn update_lead_tags(
        &self,
        lead_id: Uuid,
        tags: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let lead = t.lead_mut(lead_id)?;
        lead.tags = tags.map(str::to_string);
        lead.updated_at = now;
        Ok(())
    }

    async fn record_interaction(
        &self,
        lead_id: Uuid,
        interaction_type: InteractionType,
        weight: i32,
        metadata: &Value,
        now: DateTime<Utc>,
    ) -> Result<(LeadInteraction, i32), StoreError> {
        let mut t = self.tables.lock().await;
        let lead = t.lead_mut(lead_id)?;
        lead.lead_score += weight;
        lead.updated_at = now;
        let score = lead.lead_score;

        let interaction = LeadInteraction {
            id: Uuid::new_v4(),
            lead_id,
            interaction_type,
            score_weight: weight,
            metadata: metadata.clone(),
            occurred_at: now,
        };
        t.interactions.push(interaction.clone());
        Ok((interaction, score))
    }

    async fn interactions_for_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Vec<LeadInteraction>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<LeadInteraction> = t
            .interactions
            .iter()
            .filter(|i| i.lead_id == lead_id)
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(rows)
    }

    async fn recent_property_interactions(
        &self,
        lead_id: Uuid,
        types: &[InteractionType],
        limit: i64,
    ) -> Result<Vec<LeadInteraction>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<LeadInteraction> = t
            .interactions
            .iter()
            .rev()
            .filter(|i| {
                i.lead_id == lead_id
                    && types.contains(&i.interaction_type)
                    && i.metadata.get("propertyId").is_some_and(|v| !v.is_null())
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn increment_campaign_counter(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        counter: CampaignCounter,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(campaign) = t
            .campaigns
            .iter_mut()
            .find(|c| c.id == campaign_id && c.tenant_id == tenant_id)
        else {
            return Ok(false);
        };
        match counter {
            CampaignCounter::Opened => campaign.opened_count += 1,
            CampaignCounter::Clicked => campaign.clicked_count += 1,
        }
        Ok(true)
    }

    async fn find_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.agents.iter().find(|a| a.id == agent_id).cloned())
    }

    async fn active_agents_by_rotation(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let t = self.tables.lock().await;
        let mut agents: Vec<Agent> = t
            .agents
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.status == AgentStatus::Active)
            .cloned()
            .collect();
        agents.sort_by_key(|a| {
            (
                a.last_lead_assigned_at.is_some(),
                a.last_lead_assigned_at,
                a.created_at,
            )
        });
        Ok(agents)
    }

    async fn active_assignment(&self, lead_id: Uuid) -> Result<Option<AgentLead>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.active_assignment(lead_id).cloned())
    }

    async fn assignment_history(&self, lead_id: Uuid) -> Result<Vec<AgentLead>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.agent_leads
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn insert_assignment(
        &self,
        agent_id: Uuid,
        lead_id: Uuid,
        rotate: bool,
        now: DateTime<Utc>,
    ) -> Result<Insert<AgentLead>, StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.active_assignment(lead_id) {
            return Ok(Insert::Existing(existing.clone()));
        }

        let row = t.new_assignment(agent_id, lead_id, now);
        if rotate {
            if let Some(agent) = t.agents.iter_mut().find(|a| a.id == agent_id) {
                agent.last_lead_assigned_at = Some(now);
                agent.total_leads += 1;
            }
        }
        Ok(Insert::Created(row))
    }

    async fn reassign_lead(
        &self,
        lead_id: Uuid,
        agent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<AgentLead>, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.leads.iter().any(|l| l.id == lead_id) {
            return Err(StoreError::MissingRow("lead"));
        }
        for row in t.agent_leads.iter_mut().filter(|a| a.lead_id == lead_id) {
            row.status = AssignmentStatus::Inactive;
        }
        Ok(agent_id.map(|agent_id| t.new_assignment(agent_id, lead_id, now)))
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.bookings.iter().find(|b| b.id == booking_id).cloned())
    }

    async fn latest_lead_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Lead>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.leads
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.user_id == Some(user_id))
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn latest_agent_for_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.leads
            .iter()
            .filter(|l| {
                l.tenant_id == tenant_id
                    && l.email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .filter_map(|l| t.active_assignment(l.id).map(|a| (l.created_at, a.agent_id)))
            .max_by_key(|(created_at, _)| *created_at)
            .map(|(_, agent_id)| agent_id))
    }

    async fn insert_commission(
        &self,
        commission: &NewCommission,
        now: DateTime<Utc>,
    ) -> Result<Insert<Commission>, StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t
            .commissions
            .iter()
            .find(|c| c.booking_id == commission.booking_id)
        {
            return Ok(Insert::Existing(existing.clone()));
        }

        let row = Commission {
            id: Uuid::new_v4(),
            tenant_id: commission.tenant_id,
            agent_id: commission.agent_id,
            booking_id: commission.booking_id,
            amount: commission.amount,
            rate_snapshot: commission.rate_snapshot,
            status: CommissionStatus::Pending,
            created_at: now,
        };
        t.commissions.push(row.clone());
        if let Some(agent) = t.agents.iter_mut().find(|a| a.id == commission.agent_id) {
            agent.total_deals += 1;
        }
        Ok(Insert::Created(row))
    }

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<Commission>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Commission> = t
            .commissions
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn properties_with_units(
        &self,
        property_ids: &[Uuid],
    ) -> Result<Vec<PropertyWithUnits>, StoreError> {
        let t = self.tables.lock().await;
        let properties: Vec<Property> = property_ids
            .iter()
            .filter_map(|id| t.properties.iter().find(|p| p.id == *id))
            .cloned()
            .collect();
        Ok(attach_units(properties, t.units.clone()))
    }

    async fn candidate_properties(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<PropertyWithUnits>, StoreError> {
        let t = self.tables.lock().await;
        let unfiltered = query.cities.is_empty() && query.property_types.is_empty();
        let lower = |v: &Option<String>| v.as_deref().map(str::to_lowercase);

        let mut properties: Vec<Property> = t
            .properties
            .iter()
            .filter(|p| p.tenant_id == query.tenant_id && p.is_active)
            .filter(|p| {
                unfiltered
                    || lower(&p.city).is_some_and(|c| query.cities.contains(&c))
                    || lower(&p.property_type).is_some_and(|k| query.property_types.contains(&k))
            })
            .filter(|p| {
                t.units.iter().any(|u| {
                    u.property_id == p.id
                        && u.is_available
                        && u.price.is_some_and(|price| price <= query.max_price)
                })
            })
            .cloned()
            .collect();
        properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        properties.truncate(query.limit.max(0) as usize);

        let available = t.units.iter().filter(|u| u.is_available).cloned().collect();
        Ok(attach_units(properties, available))
    }

    async fn find_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<MarketingWorkflow>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.workflows.iter().find(|w| w.id == workflow_id).cloned())
    }

    async fn active_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger: &TriggerType,
    ) -> Result<Vec<MarketingWorkflow>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<MarketingWorkflow> = t
            .workflows
            .iter()
            .filter(|w| {
                w.tenant_id == tenant_id
                    && w.status == WorkflowStatus::Active
                    && w.trigger
                        .trigger_type
                        .as_str()
                        .eq_ignore_ascii_case(trigger.as_str())
            })
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    async fn find_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.templates.iter().find(|tpl| tpl.id == template_id).cloned())
    }

    async fn enroll(
        &self,
        workflow_id: Uuid,
        lead_id: Uuid,
        first_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Insert<WorkflowEnrollment>, StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t
            .enrollments
            .iter()
            .find(|e| e.workflow_id == workflow_id && e.lead_id == lead_id)
        {
            return Ok(Insert::Existing(existing.clone()));
        }

        let (status, next_action_at) = match first_step {
            Some(_) => (EnrollmentStatus::Active, Some(now)),
            None => (EnrollmentStatus::Completed, None),
        };
        let row = WorkflowEnrollment {
            id: Uuid::new_v4(),
            workflow_id,
            lead_id,
            current_step: first_step.map(str::to_string),
            status,
            next_action_at,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        t.enrollments.push(row.clone());
        Ok(Insert::Created(row))
    }

    async fn find_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<WorkflowEnrollment>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.enrollments.iter().find(|e| e.id == enrollment_id).cloned())
    }

    async fn due_enrollments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowEnrollment>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<WorkflowEnrollment> = t
            .enrollments
            .iter()
            .filter(|e| {
                e.status == EnrollmentStatus::Active && e.next_action_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.next_action_at);
        Ok(rows)
    }

    async fn claim_enrollment(
        &self,
        enrollment: &WorkflowEnrollment,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<WorkflowEnrollment>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.enrollments
            .iter_mut()
            .find(|e| {
                e.id == enrollment.id
                    && e.version == enrollment.version
                    && e.status == EnrollmentStatus::Active
                    && e.next_action_at.is_some_and(|at| at <= now)
            })
            .map(|e| {
                e.version += 1;
                e.next_action_at = Some(lease_until);
                e.updated_at = now;
                e.clone()
            }))
    }

    async fn advance_enrollment(
        &self,
        claimed: &WorkflowEnrollment,
        next_step: Option<&str>,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(row) = t
            .enrollments
            .iter_mut()
            .find(|e| e.id == claimed.id && e.version == claimed.version)
        else {
            return Ok(false);
        };
        row.current_step = next_step.map(str::to_string);
        row.status = if next_step.is_some() {
            EnrollmentStatus::Active
        } else {
            EnrollmentStatus::Completed
        };
        row.next_action_at = next_action_at;
        row.version += 1;
        row.updated_at = now;
        Ok(true)
    }

    async fn write_workflow_log(
        &self,
        log: &NewWorkflowLog,
        now: DateTime<Utc>,
    ) -> Result<WorkflowLog, StoreError> {
        let mut t = self.tables.lock().await;
        let row = WorkflowLog {
            id: Uuid::new_v4(),
            enrollment_id: log.enrollment_id,
            step_id: log.step_id.clone(),
            action_type: log.action_type.clone(),
            status: log.status.clone(),
            result: log.result.clone(),
            created_at: now,
        };
        t.logs.push(row.clone());
        Ok(row)
    }

    async fn workflow_logs(&self, enrollment_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.logs
            .iter()
            .filter(|l| l.enrollment_id == enrollment_id)
            .cloned()
            .collect())
    }
}

// ── fixtures ───────────────────────────────────────────────────────────────
// Rows owned by other services (agents, catalogue, bookings, workflow
// definitions) are seeded directly in tests.
#[cfg(test)]
impl MemoryStore {
    pub async fn insert_agent(&self, agent: Agent) {
        self.tables.lock().await.agents.push(agent);
    }

    pub async fn insert_property(&self, property: Property) {
        self.tables.lock().await.properties.push(property);
    }

    pub async fn insert_unit(&self, unit: Unit) {
        self.tables.lock().await.units.push(unit);
    }

    pub async fn insert_booking(&self, booking: Booking) {
        self.tables.lock().await.bookings.push(booking);
    }

    pub async fn set_booking_agent(&self, booking_id: Uuid, agent_id: Option<Uuid>) {
        let mut t = self.tables.lock().await;
        if let Some(b) = t.bookings.iter_mut().find(|b| b.id == booking_id) {
            b.agent_id = agent_id;
        }
    }

    pub async fn insert_workflow(&self, workflow: MarketingWorkflow) {
        self.tables.lock().await.workflows.push(workflow);
    }

    pub async fn set_workflow_status(&self, workflow_id: Uuid, status: WorkflowStatus) {
        let mut t = self.tables.lock().await;
        if let Some(w) = t.workflows.iter_mut().find(|w| w.id == workflow_id) {
            w.status = status;
        }
    }

    pub async fn insert_template(&self, template: EmailTemplate) {
        self.tables.lock().await.templates.push(template);
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.tables.lock().await.campaigns.push(campaign);
    }

    pub async fn campaign(&self, campaign_id: Uuid) -> Option<Campaign> {
        let t = self.tables.lock().await;
        t.campaigns.iter().find(|c| c.id == campaign_id).cloned()
    }

    pub async fn set_agent_rate(&self, agent_id: Uuid, rate: f64) {
        let mut t = self.tables.lock().await;
        if let Some(a) = t.agents.iter_mut().find(|a| a.id == agent_id) {
            a.commission_rate = rate;
        }
    }

    pub async fn lead_count(&self) -> usize {
        self.tables.lock().await.leads.len()
    }
}
