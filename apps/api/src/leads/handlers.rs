use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Actor;
use crate::errors::AppError;
use crate::jobs::Job;
use crate::leads::capture::{capture_lead, update_lead_status, Captured};
use crate::leads::interactions::{track_interaction, LeadRef, Tracked};
use crate::matching::preferences::is_preference_signal;
use crate::models::lead::{InteractionType, Lead, LeadCapture, LeadStatus};
use crate::state::AppState;

/// POST /api/v1/leads/capture
pub async fn handle_capture(
    State(state): State<AppState>,
    actor: Actor,
    Json(mut req): Json<LeadCapture>,
) -> Result<(StatusCode, Json<Captured>), AppError> {
    req.user_id = actor.customer_id();
    let captured = capture_lead(
        state.services.store.as_ref(),
        actor.tenant_id,
        req,
        Utc::now(),
    )
    .await?;

    if !captured.created {
        return Ok((StatusCode::OK, Json(captured)));
    }

    let lead_id = captured.lead.id;
    if state.services.auto_assign {
        state.jobs.enqueue(Job::AutoAssignLead {
            tenant_id: actor.tenant_id,
            lead_id,
        });
    }
    state.jobs.enqueue(Job::EnrollLeadCreated {
        tenant_id: actor.tenant_id,
        lead_id,
    });
    Ok((StatusCode::CREATED, Json(captured)))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: LeadStatus,
}

/// PATCH /api/v1/leads/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<Lead>, AppError> {
    let lead = update_lead_status(
        state.services.store.as_ref(),
        actor.tenant_id,
        lead_id,
        req.status,
        Utc::now(),
    )
    .await?;
    Ok(Json(lead))
}

#[derive(Deserialize)]
pub struct TrackRequest {
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Deserialize)]
pub struct TrackByEmailRequest {
    pub email: String,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub metadata: Value,
}

/// POST /api/v1/leads/:id/interactions
pub async fn handle_track(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<TrackRequest>,
) -> Result<(StatusCode, Json<Tracked>), AppError> {
    let tracked = track(
        &state,
        LeadRef::Id(lead_id),
        Some(actor.tenant_id),
        req.interaction_type,
        req.metadata,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

/// POST /api/v1/interactions
pub async fn handle_track_by_email(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<TrackByEmailRequest>,
) -> Result<(StatusCode, Json<Tracked>), AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::Validation("email is required".to_string()));
    }
    let tracked = track(
        &state,
        LeadRef::Email {
            tenant_id: actor.tenant_id,
            email: req.email,
        },
        None,
        req.interaction_type,
        req.metadata,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

async fn track(
    state: &AppState,
    lead: LeadRef,
    scope: Option<Uuid>,
    interaction_type: InteractionType,
    metadata: Value,
) -> Result<Tracked, AppError> {
    let services = &state.services;
    let tracked = track_interaction(
        services.store.as_ref(),
        &services.weights,
        lead,
        scope,
        interaction_type,
        metadata,
        Utc::now(),
    )
    .await?;

    if is_preference_signal(&tracked.interaction) {
        state.jobs.enqueue(Job::RefreshLeadPreferences {
            lead_id: tracked.interaction.lead_id,
        });
    }
    Ok(tracked)
}
