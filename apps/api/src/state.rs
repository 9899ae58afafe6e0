use std::sync::Arc;

use crate::config::Config;
use crate::email::EmailSender;
use crate::jobs::JobQueue;
use crate::leads::interactions::InteractionWeights;
use crate::matching::recommend::MatchWeights;
use crate::store::CrmStore;
use crate::tracking::TrackingLinks;

/// Collaborators shared by request handlers, background jobs and the
/// workflow tick.
pub struct Services {
    pub store: Arc<dyn CrmStore>,
    pub email: Arc<dyn EmailSender>,
    pub links: TrackingLinks,
    pub weights: InteractionWeights,
    pub match_weights: MatchWeights,
    /// How long a tick holds an enrollment before another tick may retry it.
    pub claim_lease: chrono::Duration,
    pub default_budget_ceiling: f64,
    pub auto_assign: bool,
}

impl Services {
    pub fn new(config: &Config, store: Arc<dyn CrmStore>, email: Arc<dyn EmailSender>) -> Self {
        Self {
            store,
            email,
            links: TrackingLinks::new(&config.public_base_url),
            weights: InteractionWeights::default(),
            match_weights: MatchWeights::default(),
            claim_lease: chrono::Duration::seconds(config.workflow_claim_lease_secs as i64),
            default_budget_ceiling: config.default_budget_ceiling,
            auto_assign: config.auto_assign_leads,
        }
    }
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub jobs: JobQueue,
}
