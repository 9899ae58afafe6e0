use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::workflow::WorkflowEnrollment;
use crate::state::AppState;
use crate::workflows::engine::{enroll_lead, process_workflows, TickSummary};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub lead_id: Uuid,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub enrollment: WorkflowEnrollment,
    pub created: bool,
}

/// POST /api/v1/workflows/:id/enroll
pub async fn handle_enroll(
    State(state): State<AppState>,
    actor: Actor,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), AppError> {
    let outcome = enroll_lead(
        &state.services,
        actor.tenant_id,
        workflow_id,
        req.lead_id,
        Utc::now(),
    )
    .await?;
    let created = outcome.is_created();
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(EnrollResponse {
            enrollment: outcome.into_inner(),
            created,
        }),
    ))
}

/// POST /api/v1/workflows/process
///
/// One tick, normally called by the external scheduler.
pub async fn handle_process(
    State(state): State<AppState>,
) -> Result<Json<TickSummary>, AppError> {
    let summary = process_workflows(&state.services, Utc::now()).await?;
    Ok(Json(summary))
}
