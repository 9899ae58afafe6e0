use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::agent::{Agent, AgentLead, Commission, NewCommission};
use crate::models::booking::Booking;
use crate::models::campaign::CampaignCounter;
use crate::models::lead::{
    apply_recapture, InteractionType, Lead, LeadCapture, LeadInteraction, LeadStatus,
};
use crate::models::property::{attach_units, Property, PropertyWithUnits, Unit};
use crate::models::workflow::{
    EmailTemplate, EnrollmentStatus, MarketingWorkflow, NewWorkflowLog, TriggerType,
    WorkflowEnrollment, WorkflowLog,
};
use crate::store::{CandidateQuery, CrmStore, Insert, StoreError};

const AGENT_SELECT: &str = r#"
    SELECT a.id, a.tenant_id, a.user_id, u.name, u.email, a.specialization,
           a.commission_rate, a.status, a.total_leads, a.total_deals,
           a.last_lead_assigned_at, a.created_at
    FROM agents a
    JOIN users u ON u.id = a.user_id
"#;

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.tenant_id, b.user_id, b.agent_id, b.unit_id, b.status, b.total_price,
           u.email AS customer_email, u.name AS customer_name, b.created_at
    FROM bookings b
    LEFT JOIN users u ON u.id = b.user_id
"#;

const AGENT_LEAD_COLUMNS: &str = "id, agent_id, lead_id, is_primary, status, assigned_at";

/// PostgreSQL-backed store. Atomic operations run in a single transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn find_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_latest_lead_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE tenant_id = $1 AND lower(email) = lower($2) ORDER BY created_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn capture_lead(
        &self,
        tenant_id: Uuid,
        capture: &LeadCapture,
        now: DateTime<Utc>,
    ) -> Result<Insert<Lead>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise captures per tenant so two submissions cannot both insert.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;

        let existing: Option<Lead> = sqlx::query_as(
            r#"
            SELECT * FROM leads
            WHERE tenant_id = $1 AND (email = $2 OR phone = $3)
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(capture.email.as_deref())
        .bind(capture.phone.as_deref())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some(existing) => {
                let merged = apply_recapture(&existing, capture, now);
                let lead: Lead = sqlx::query_as(
                    r#"
                    UPDATE leads
                    SET name = $2, email = $3, phone = $4, budget = $5, notes = $6,
                        property_id = $7, unit_id = $8, user_id = $9, updated_at = $10
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(merged.id)
                .bind(&merged.name)
                .bind(&merged.email)
                .bind(&merged.phone)
                .bind(merged.budget)
                .bind(&merged.notes)
                .bind(merged.property_id)
                .bind(merged.unit_id)
                .bind(merged.user_id)
                .bind(merged.updated_at)
                .fetch_one(&mut *tx)
                .await?;
                Insert::Existing(lead)
            }
            None => {
                let fresh = capture.clone().into_new_lead(tenant_id, now);
                let lead: Lead = sqlx::query_as(
                    r#"
                    INSERT INTO leads
                        (id, tenant_id, name, email, phone, status, priority, source,
                         lead_score, budget, preferences, tags, property_id, unit_id,
                         user_id, notes, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                    RETURNING *
                    "#,
                )
                .bind(fresh.id)
                .bind(fresh.tenant_id)
                .bind(&fresh.name)
                .bind(&fresh.email)
                .bind(&fresh.phone)
                .bind(fresh.status)
                .bind(fresh.priority)
                .bind(fresh.source)
                .bind(fresh.lead_score)
                .bind(fresh.budget)
                .bind(&fresh.preferences)
                .bind(&fresh.tags)
                .bind(fresh.property_id)
                .bind(fresh.unit_id)
                .bind(fresh.user_id)
                .bind(&fresh.notes)
                .bind(fresh.created_at)
                .bind(fresh.updated_at)
                .fetch_one(&mut *tx)
                .await?;
                Insert::Created(lead)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_lead_status(
        &self,
        lead_id: Uuid,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(sqlx::query_as::<_, Lead>(
            "UPDATE leads SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(lead_id)
        .bind(status)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn update_lead_preferences(
        &self,
        lead_id: Uuid,
        preferences: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE leads SET preferences = $2, updated_at = $3 WHERE id = $1")
                .bind(lead_id)
                .bind(preferences)
                .bind(now)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("lead"));
        }
        Ok(())
    }

    async fn update_lead_tags(
        &self,
        lead_id: Uuid,
        tags: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE leads SET tags = $2, updated_at = $3 WHERE id = $1")
            .bind(lead_id)
            .bind(tags)
            .bind(now)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("lead"));
        }
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
        let mut tx = self.pool.begin().await?;

        let score: Option<i32> = sqlx::query_scalar(
            "UPDATE leads SET lead_score = lead_score + $2, updated_at = $3 WHERE id = $1 RETURNING lead_score",
        )
        .bind(lead_id)
        .bind(weight)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let score = score.ok_or(StoreError::MissingRow("lead"))?;

        let interaction: LeadInteraction = sqlx::query_as(
            r#"
            INSERT INTO lead_interactions (lead_id, interaction_type, score_weight, metadata, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(lead_id)
        .bind(interaction_type)
        .bind(weight)
        .bind(metadata)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((interaction, score))
    }

    async fn interactions_for_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Vec<LeadInteraction>, StoreError> {
        Ok(sqlx::query_as::<_, LeadInteraction>(
            "SELECT * FROM lead_interactions WHERE lead_id = $1 ORDER BY occurred_at DESC",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn recent_property_interactions(
        &self,
        lead_id: Uuid,
        types: &[InteractionType],
        limit: i64,
    ) -> Result<Vec<LeadInteraction>, StoreError> {
        let type_names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        Ok(sqlx::query_as::<_, LeadInteraction>(
            r#"
            SELECT * FROM lead_interactions
            WHERE lead_id = $1
              AND interaction_type::text = ANY($2)
              AND metadata->>'propertyId' IS NOT NULL
            ORDER BY occurred_at DESC
            LIMIT $3
            "#,
        )
        .bind(lead_id)
        .bind(type_names)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn increment_campaign_counter(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        counter: CampaignCounter,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE campaigns SET {col} = {col} + 1 WHERE id = $1 AND tenant_id = $2",
            col = counter.column()
        );
        let result = sqlx::query(&sql)
            .bind(campaign_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_agent(&self, agent_id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(
            sqlx::query_as::<_, Agent>(&format!("{AGENT_SELECT} WHERE a.id = $1"))
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn active_agents_by_rotation(&self, tenant_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        Ok(sqlx::query_as::<_, Agent>(&format!(
            "{AGENT_SELECT} WHERE a.tenant_id = $1 AND a.status = 'ACTIVE' \
             ORDER BY a.last_lead_assigned_at ASC NULLS FIRST, a.created_at ASC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn active_assignment(&self, lead_id: Uuid) -> Result<Option<AgentLead>, StoreError> {
        Ok(sqlx::query_as::<_, AgentLead>(&format!(
            "SELECT {AGENT_LEAD_COLUMNS} FROM agent_leads WHERE lead_id = $1 AND status = 'ACTIVE'"
        ))
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn assignment_history(&self, lead_id: Uuid) -> Result<Vec<AgentLead>, StoreError> {
        Ok(sqlx::query_as::<_, AgentLead>(&format!(
            "SELECT {AGENT_LEAD_COLUMNS} FROM agent_leads WHERE lead_id = $1 ORDER BY assigned_at ASC"
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_assignment(
        &self,
        agent_id: Uuid,
        lead_id: Uuid,
        rotate: bool,
        now: DateTime<Utc>,
    ) -> Result<Insert<AgentLead>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<AgentLead> = sqlx::query_as(&format!(
            r#"
            INSERT INTO agent_leads (agent_id, lead_id, is_primary, status, assigned_at, updated_at)
            VALUES ($1, $2, TRUE, 'ACTIVE', $3, $3)
            ON CONFLICT (lead_id) WHERE status = 'ACTIVE' DO NOTHING
            RETURNING {AGENT_LEAD_COLUMNS}
            "#
        ))
        .bind(agent_id)
        .bind(lead_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(row) => {
                if rotate {
                    sqlx::query(
                        "UPDATE agents SET last_lead_assigned_at = $2, total_leads = total_leads + 1 WHERE id = $1",
                    )
                    .bind(agent_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                Insert::Created(row)
            }
            None => {
                let existing: AgentLead = sqlx::query_as(&format!(
                    "SELECT {AGENT_LEAD_COLUMNS} FROM agent_leads WHERE lead_id = $1 AND status = 'ACTIVE'"
                ))
                .bind(lead_id)
                .fetch_one(&mut *tx)
                .await?;
                Insert::Existing(existing)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn reassign_lead(
        &self,
        lead_id: Uuid,
        agent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<AgentLead>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // concurrent reassigns of one lead queue here instead of racing on the
        // one-active-assignment index
        sqlx::query("SELECT id FROM leads WHERE id = $1 FOR UPDATE")
            .bind(lead_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::MissingRow("lead"))?;

        sqlx::query(
            "UPDATE agent_leads SET status = 'INACTIVE', updated_at = $2 WHERE lead_id = $1 AND status = 'ACTIVE'",
        )
        .bind(lead_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let created = match agent_id {
            Some(agent_id) => Some(
                sqlx::query_as::<_, AgentLead>(&format!(
                    r#"
                    INSERT INTO agent_leads (agent_id, lead_id, is_primary, status, assigned_at, updated_at)
                    VALUES ($1, $2, TRUE, 'ACTIVE', $3, $3)
                    RETURNING {AGENT_LEAD_COLUMNS}
                    "#
                ))
                .bind(agent_id)
                .bind(lead_id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?,
            ),
            None => None,
        };

        tx.commit().await?;
        Ok(created)
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(
            sqlx::query_as::<_, Booking>(&format!("{BOOKING_SELECT} WHERE b.id = $1"))
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn latest_lead_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Lead>, StoreError> {
        Ok(sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE tenant_id = $1 AND user_id = $2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn latest_agent_for_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT al.agent_id
            FROM leads l
            JOIN agent_leads al ON al.lead_id = l.id AND al.status = 'ACTIVE'
            WHERE l.tenant_id = $1 AND lower(l.email) = lower($2)
            ORDER BY l.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_commission(
        &self,
        commission: &NewCommission,
        now: DateTime<Utc>,
    ) -> Result<Insert<Commission>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<Commission> = sqlx::query_as(
            r#"
            INSERT INTO commissions (tenant_id, agent_id, booking_id, amount, rate_snapshot, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', $6)
            ON CONFLICT (booking_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(commission.tenant_id)
        .bind(commission.agent_id)
        .bind(commission.booking_id)
        .bind(commission.amount)
        .bind(commission.rate_snapshot)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(row) => {
                sqlx::query("UPDATE agents SET total_deals = total_deals + 1 WHERE id = $1")
                    .bind(commission.agent_id)
                    .execute(&mut *tx)
                    .await?;
                Insert::Created(row)
            }
            None => Insert::Existing(
                sqlx::query_as("SELECT * FROM commissions WHERE booking_id = $1")
                    .bind(commission.booking_id)
                    .fetch_one(&mut *tx)
                    .await?,
            ),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<Commission>, StoreError> {
        Ok(sqlx::query_as::<_, Commission>(
            "SELECT * FROM commissions WHERE agent_id = $1 ORDER BY created_at DESC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn properties_with_units(
        &self,
        property_ids: &[Uuid],
    ) -> Result<Vec<PropertyWithUnits>, StoreError> {
        if property_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut properties: Vec<Property> =
            sqlx::query_as("SELECT * FROM properties WHERE id = ANY($1)")
                .bind(property_ids)
                .fetch_all(&self.pool)
                .await?;
        properties.sort_by_key(|p| property_ids.iter().position(|id| *id == p.id));

        let units: Vec<Unit> = sqlx::query_as("SELECT * FROM units WHERE property_id = ANY($1)")
            .bind(property_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(attach_units(properties, units))
    }

    async fn candidate_properties(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<PropertyWithUnits>, StoreError> {
        let properties: Vec<Property> = sqlx::query_as(
            r#"
            SELECT p.* FROM properties p
            WHERE p.tenant_id = $1
              AND p.is_active
              AND (
                    (cardinality($2::text[]) = 0 AND cardinality($3::text[]) = 0)
                    OR lower(p.city) = ANY($2)
                    OR lower(p.property_type) = ANY($3)
                  )
              AND EXISTS (
                    SELECT 1 FROM units u
                    WHERE u.property_id = p.id AND u.is_available AND u.price <= $4
                  )
            ORDER BY p.created_at DESC
            LIMIT $5
            "#,
        )
        .bind(query.tenant_id)
        .bind(&query.cities)
        .bind(&query.property_types)
        .bind(query.max_price)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = properties.iter().map(|p| p.id).collect();
        let units: Vec<Unit> =
            sqlx::query_as("SELECT * FROM units WHERE property_id = ANY($1) AND is_available")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(attach_units(properties, units))
    }

    async fn find_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<MarketingWorkflow>, StoreError> {
        Ok(
            sqlx::query_as::<_, MarketingWorkflow>("SELECT * FROM marketing_workflows WHERE id = $1")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn active_workflows_for_trigger(
        &self,
        tenant_id: Uuid,
        trigger: &TriggerType,
    ) -> Result<Vec<MarketingWorkflow>, StoreError> {
        Ok(sqlx::query_as::<_, MarketingWorkflow>(
            r#"
            SELECT * FROM marketing_workflows
            WHERE tenant_id = $1 AND status = 'ACTIVE' AND upper(trigger->>'type') = upper($2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(
            sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates WHERE id = $1")
                .bind(template_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn enroll(
        &self,
        workflow_id: Uuid,
        lead_id: Uuid,
        first_step: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Insert<WorkflowEnrollment>, StoreError> {
        let (status, next_action_at) = match first_step {
            Some(_) => (EnrollmentStatus::Active, Some(now)),
            None => (EnrollmentStatus::Completed, None),
        };

        let inserted: Option<WorkflowEnrollment> = sqlx::query_as(
            r#"
            INSERT INTO workflow_enrollments
                (workflow_id, lead_id, current_step, status, next_action_at, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
            ON CONFLICT (workflow_id, lead_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(workflow_id)
        .bind(lead_id)
        .bind(first_step)
        .bind(status)
        .bind(next_action_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(Insert::Created(row)),
            None => Ok(Insert::Existing(
                sqlx::query_as(
                    "SELECT * FROM workflow_enrollments WHERE workflow_id = $1 AND lead_id = $2",
                )
                .bind(workflow_id)
                .bind(lead_id)
                .fetch_one(&self.pool)
                .await?,
            )),
        }
    }

    async fn find_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<WorkflowEnrollment>, StoreError> {
        Ok(sqlx::query_as::<_, WorkflowEnrollment>(
            "SELECT * FROM workflow_enrollments WHERE id = $1",
        )
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn due_enrollments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowEnrollment>, StoreError> {
        Ok(sqlx::query_as::<_, WorkflowEnrollment>(
            r#"
            SELECT * FROM workflow_enrollments
            WHERE status = 'ACTIVE' AND next_action_at <= $1
            ORDER BY next_action_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn claim_enrollment(
        &self,
        enrollment: &WorkflowEnrollment,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<WorkflowEnrollment>, StoreError> {
        Ok(sqlx::query_as::<_, WorkflowEnrollment>(
            r#"
            UPDATE workflow_enrollments
            SET version = version + 1, next_action_at = $3, updated_at = $2
            WHERE id = $1 AND version = $4 AND status = 'ACTIVE' AND next_action_at <= $2
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(now)
        .bind(lease_until)
        .bind(enrollment.version)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn advance_enrollment(
        &self,
        claimed: &WorkflowEnrollment,
        next_step: Option<&str>,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let status = if next_step.is_some() {
            EnrollmentStatus::Active
        } else {
            EnrollmentStatus::Completed
        };
        let result = sqlx::query(
            r#"
            UPDATE workflow_enrollments
            SET current_step = $2, status = $3, next_action_at = $4,
                version = version + 1, updated_at = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(claimed.id)
        .bind(next_step)
        .bind(status)
        .bind(next_action_at)
        .bind(now)
        .bind(claimed.version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn write_workflow_log(
        &self,
        log: &NewWorkflowLog,
        now: DateTime<Utc>,
    ) -> Result<WorkflowLog, StoreError> {
        Ok(sqlx::query_as::<_, WorkflowLog>(
            r#"
            INSERT INTO workflow_logs (enrollment_id, step_id, action_type, status, result, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(log.enrollment_id)
        .bind(&log.step_id)
        .bind(&log.action_type)
        .bind(&log.status)
        .bind(&log.result)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn workflow_logs(&self, enrollment_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        Ok(sqlx::query_as::<_, WorkflowLog>(
            "SELECT * FROM workflow_logs WHERE enrollment_id = $1 ORDER BY created_at ASC",
        )
        .bind(enrollment_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
