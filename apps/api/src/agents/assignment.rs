//! Routing leads to agents.
//!
//! Round robin prefers agents that were never assigned, then the one whose
//! last assignment is oldest, then the oldest agent. Only the round-robin
//! path moves the rotation (`last_lead_assigned_at`, `total_leads`); direct
//! assignment and reassignment leave agent counters alone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::capture::load_tenant_lead;
use crate::models::agent::{Agent, AgentLead, AgentStatus};
use crate::store::{CrmStore, Insert};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assigned {
    pub agent: Agent,
    pub assignment: AgentLead,
    /// False when the lead already had this assignment.
    pub created: bool,
}

/// Next agent in the rotation.
pub fn pick_round_robin(agents: &[Agent]) -> Option<&Agent> {
    agents
        .iter()
        .filter(|a| a.status == AgentStatus::Active)
        .min_by_key(|a| {
            (
                a.last_lead_assigned_at.is_some(),
                a.last_lead_assigned_at,
                a.created_at,
            )
        })
}

async fn load_tenant_agent(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    agent_id: Uuid,
) -> Result<Agent, AppError> {
    store
        .find_agent(agent_id)
        .await?
        .filter(|a| a.tenant_id == tenant_id)
        .ok_or_else(|| AppError::NotFound(format!("Agent {agent_id} not found")))
}

/// Assigns the lead to the next agent in the tenant's rotation. `None` when
/// the tenant has no active agent. A lead that already has an active
/// assignment keeps it and the rotation does not move.
pub async fn assign_round_robin(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Assigned>, AppError> {
    load_tenant_lead(store, tenant_id, lead_id).await?;

    if let Some(existing) = store.active_assignment(lead_id).await? {
        let agent = load_tenant_agent(store, tenant_id, existing.agent_id).await?;
        return Ok(Some(Assigned {
            agent,
            assignment: existing,
            created: false,
        }));
    }

    let agents = store.active_agents_by_rotation(tenant_id).await?;
    let Some(chosen) = pick_round_robin(&agents) else {
        info!(%tenant_id, %lead_id, "No active agents, lead left unassigned");
        return Ok(None);
    };

    let outcome = store
        .insert_assignment(chosen.id, lead_id, true, now)
        .await?;
    let created = outcome.is_created();
    let assignment = outcome.into_inner();
    let agent = load_tenant_agent(store, tenant_id, assignment.agent_id).await?;

    if created {
        info!(%lead_id, agent_id = %agent.id, "Lead assigned by round robin");
    }
    Ok(Some(Assigned {
        agent,
        assignment,
        created,
    }))
}

/// Direct assignment. Re-assigning the same pair is a no-op returning the
/// existing row; a lead actively held by another agent must be reassigned.
pub async fn assign_lead(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    agent_id: Uuid,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Assigned, AppError> {
    load_tenant_lead(store, tenant_id, lead_id).await?;
    let agent = load_tenant_agent(store, tenant_id, agent_id).await?;

    let outcome = store.insert_assignment(agent_id, lead_id, false, now).await?;
    match outcome {
        Insert::Created(assignment) => Ok(Assigned {
            agent,
            assignment,
            created: true,
        }),
        Insert::Existing(assignment) if assignment.agent_id == agent_id => Ok(Assigned {
            agent,
            assignment,
            created: false,
        }),
        Insert::Existing(assignment) => Err(AppError::Conflict(format!(
            "Lead {lead_id} is assigned to agent {}; reassign it instead",
            assignment.agent_id
        ))),
    }
}

/// Deactivates every active assignment of the lead, then links `agent_id`
/// when given. Passing `None` unassigns.
pub async fn reassign_lead(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    lead_id: Uuid,
    agent_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Option<AgentLead>, AppError> {
    load_tenant_lead(store, tenant_id, lead_id).await?;
    if let Some(agent_id) = agent_id {
        load_tenant_agent(store, tenant_id, agent_id).await?;
    }
    let assignment = store.reassign_lead(lead_id, agent_id, now).await?;
    info!(%lead_id, agent_id = ?agent_id, "Lead reassigned");
    Ok(assignment)
}
