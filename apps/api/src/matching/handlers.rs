use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Actor;
use crate::email::templates::send_property_recommendation_email;
use crate::errors::AppError;
use crate::leads::capture::load_tenant_lead;
use crate::matching::preferences::update_lead_preferences;
use crate::matching::recommend::{get_recommendations, Recommendation, DEFAULT_LIMIT};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub updated: bool,
    pub preferences: Value,
}

/// POST /api/v1/leads/:id/preferences/refresh
pub async fn handle_refresh_preferences(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<PreferencesResponse>, AppError> {
    let store = state.services.store.as_ref();
    let lead = load_tenant_lead(store, actor.tenant_id, lead_id).await?;
    let response = match update_lead_preferences(store, lead_id, Utc::now()).await? {
        Some(preferences) => PreferencesResponse {
            updated: true,
            preferences,
        },
        None => PreferencesResponse {
            updated: false,
            preferences: lead.preferences,
        },
    };
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/leads/:id/recommendations
pub async fn handle_recommendations(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<Recommendation>>, AppError> {
    let services = &state.services;
    let ranked = get_recommendations(
        services.store.as_ref(),
        &services.match_weights,
        actor.tenant_id,
        lead_id,
        params.limit.unwrap_or(DEFAULT_LIMIT),
        services.default_budget_ceiling,
    )
    .await?;
    Ok(Json(ranked))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationEmailResponse {
    pub sent: bool,
    pub count: usize,
}

/// POST /api/v1/leads/:id/recommendations/email
pub async fn handle_email_recommendations(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<RecommendationEmailResponse>, AppError> {
    let services = &state.services;
    let lead = load_tenant_lead(services.store.as_ref(), actor.tenant_id, lead_id).await?;
    if lead.email.is_none() {
        return Err(AppError::Validation(format!("Lead {lead_id} has no email")));
    }

    let ranked = get_recommendations(
        services.store.as_ref(),
        &services.match_weights,
        actor.tenant_id,
        lead_id,
        params.limit.unwrap_or(DEFAULT_LIMIT),
        services.default_budget_ceiling,
    )
    .await?;
    if ranked.is_empty() {
        return Ok(Json(RecommendationEmailResponse {
            sent: false,
            count: 0,
        }));
    }

    let sent = send_property_recommendation_email(services.email.as_ref(), &lead, &ranked).await?;
    Ok(Json(RecommendationEmailResponse {
        sent,
        count: ranked.len(),
    }))
}
