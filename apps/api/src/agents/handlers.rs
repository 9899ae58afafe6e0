use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::agents::assignment::{assign_lead, assign_round_robin, reassign_lead, Assigned};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::jobs::Job;
use crate::models::agent::{AgentLead, Commission};
use crate::models::booking::BookingStatus;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRobinResponse {
    /// `None` when the tenant has no active agent.
    pub assigned: Option<Assigned>,
}

/// POST /api/v1/leads/:id/assign/round-robin
pub async fn handle_round_robin(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<RoundRobinResponse>, AppError> {
    let assigned = assign_round_robin(
        state.services.store.as_ref(),
        actor.tenant_id,
        lead_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(RoundRobinResponse { assigned }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub agent_id: Uuid,
}

/// POST /api/v1/leads/:id/assign
pub async fn handle_assign(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<(StatusCode, Json<Assigned>), AppError> {
    actor.require_manager()?;
    info!(actor_id = %actor.id, %lead_id, agent_id = %req.agent_id, "Manual assignment requested");
    let assigned = assign_lead(
        state.services.store.as_ref(),
        actor.tenant_id,
        req.agent_id,
        lead_id,
        Utc::now(),
    )
    .await?;
    let status = if assigned.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(assigned)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignRequest {
    #[serde(default)]
    pub agent_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ReassignResponse {
    pub assignment: Option<AgentLead>,
}

/// POST /api/v1/leads/:id/reassign
pub async fn handle_reassign(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<ReassignResponse>, AppError> {
    actor.require_manager()?;
    info!(actor_id = %actor.id, %lead_id, agent_id = ?req.agent_id, "Reassignment requested");
    let assignment = reassign_lead(
        state.services.store.as_ref(),
        actor.tenant_id,
        lead_id,
        req.agent_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(ReassignResponse { assignment }))
}

/// GET /api/v1/agents/:id/commissions
pub async fn handle_agent_commissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<Vec<Commission>>, AppError> {
    let store = state.services.store.as_ref();
    store
        .find_agent(agent_id)
        .await?
        .filter(|a| a.tenant_id == actor.tenant_id)
        .ok_or_else(|| AppError::NotFound(format!("Agent {agent_id} not found")))?;
    Ok(Json(store.commissions_for_agent(agent_id).await?))
}

#[derive(Deserialize)]
pub struct BookingStatusChange {
    pub status: BookingStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingHookResponse {
    pub commission_queued: bool,
}

/// POST /internal/bookings/:id/status
///
/// Called by the booking flow after it commits a status change. Commission
/// work runs in the background and never fails this call.
pub async fn handle_booking_status(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<BookingStatusChange>,
) -> Result<(StatusCode, Json<BookingHookResponse>), AppError> {
    state
        .services
        .store
        .find_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;

    let commission_queued = req.status.earns_commission();
    if commission_queued {
        state.jobs.enqueue(Job::CalculateCommission { booking_id });
        state.jobs.enqueue(Job::SendBookingEmail {
            booking_id,
            status: req.status,
        });
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(BookingHookResponse { commission_queued }),
    ))
}
