pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;
use crate::{agents, leads, matching, tracking, workflows};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Email tracking (public, no actor)
        .route("/track/open", get(tracking::handlers::handle_open))
        .route("/track/click", get(tracking::handlers::handle_click))
        // Leads
        .route(
            "/api/v1/leads/capture",
            post(leads::handlers::handle_capture),
        )
        .route(
            "/api/v1/leads/:id/status",
            patch(leads::handlers::handle_update_status),
        )
        .route(
            "/api/v1/leads/:id/interactions",
            post(leads::handlers::handle_track),
        )
        .route(
            "/api/v1/interactions",
            post(leads::handlers::handle_track_by_email),
        )
        // Matching
        .route(
            "/api/v1/leads/:id/preferences/refresh",
            post(matching::handlers::handle_refresh_preferences),
        )
        .route(
            "/api/v1/leads/:id/recommendations",
            get(matching::handlers::handle_recommendations),
        )
        .route(
            "/api/v1/leads/:id/recommendations/email",
            post(matching::handlers::handle_email_recommendations),
        )
        // Assignment
        .route(
            "/api/v1/leads/:id/assign/round-robin",
            post(agents::handlers::handle_round_robin),
        )
        .route(
            "/api/v1/leads/:id/assign",
            post(agents::handlers::handle_assign),
        )
        .route(
            "/api/v1/leads/:id/reassign",
            post(agents::handlers::handle_reassign),
        )
        .route(
            "/api/v1/agents/:id/commissions",
            get(agents::handlers::handle_agent_commissions),
        )
        // Workflows
        .route(
            "/api/v1/workflows/process",
            post(workflows::handlers::handle_process),
        )
        .route(
            "/api/v1/workflows/:id/enroll",
            post(workflows::handlers::handle_enroll),
        )
        // Booking flow hook
        .route(
            "/internal/bookings/:id/status",
            post(agents::handlers::handle_booking_status),
        )
        .with_state(state)
}
