pub mod handlers;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::interactions::{track_interaction, LeadRef};
use crate::models::campaign::CampaignCounter;
use crate::models::lead::InteractionType;
use crate::state::Services;

/// Identifiers carried on every tracking URL.
#[derive(Debug, Clone, Copy)]
pub struct TrackingTarget {
    pub lead_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
}

/// Builds public pixel and click-redirect URLs rooted at the service origin.
#[derive(Debug, Clone)]
pub struct TrackingLinks {
    base_url: String,
}

impl TrackingLinks {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn open_pixel_url(&self, target: &TrackingTarget) -> String {
        format!("{}/track/open?{}", self.base_url, query(target))
    }

    pub fn click_url(&self, target: &TrackingTarget, destination: &str) -> String {
        format!(
            "{}/track/click?{}&u={}",
            self.base_url,
            query(target),
            urlencoding::encode(destination)
        )
    }

    /// True for URLs that already point at this service's tracking routes.
    pub fn is_tracking_url(&self, url: &str) -> bool {
        url.starts_with(&format!("{}/track/", self.base_url))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailEventKind {
    Open,
    Click,
}

/// A pixel load or link click, as decoded from a tracking URL.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailEvent {
    pub kind: EmailEventKind,
    pub lead_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub target_url: Option<String>,
}

/// Scores the event against the lead and bumps the campaign counter when the
/// URL named a campaign of the lead's tenant.
pub async fn record_email_event(
    services: &Services,
    event: &EmailEvent,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let store = services.store.as_ref();
    let lead = store
        .find_lead(event.lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", event.lead_id)))?;

    let (interaction_type, counter) = match event.kind {
        EmailEventKind::Open => (InteractionType::EmailOpen, CampaignCounter::Opened),
        EmailEventKind::Click => (InteractionType::EmailClick, CampaignCounter::Clicked),
    };
    let metadata = json!({
        "campaignId": event.campaign_id,
        "workflowId": event.workflow_id,
        "targetUrl": event.target_url,
    });
    track_interaction(
        store,
        &services.weights,
        LeadRef::Id(lead.id),
        Some(lead.tenant_id),
        interaction_type,
        metadata,
        now,
    )
    .await?;

    if let Some(campaign_id) = event.campaign_id {
        let bumped = store
            .increment_campaign_counter(lead.tenant_id, campaign_id, counter)
            .await?;
        if !bumped {
            debug!(%campaign_id, lead_id = %lead.id, "Campaign not in lead's tenant, counter left alone");
        }
    }
    info!(lead_id = %lead.id, kind = ?event.kind, "Email event recorded");
    Ok(())
}

fn query(target: &TrackingTarget) -> String {
    let mut parts = vec![format!("l={}", target.lead_id)];
    if let Some(campaign) = target.campaign_id {
        parts.push(format!("c={campaign}"));
    }
    if let Some(workflow) = target.workflow_id {
        parts.push(format!("w={workflow}"));
    }
    parts.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::campaign::Campaign;
    use crate::store::CrmStore;
    use crate::testing::{at, seed_lead, Harness};

    #[test]
    fn test_click_url_encodes_destination() {
        let links = TrackingLinks::new("https://crm.example.com/");
        let lead_id = Uuid::nil();
        let url = links.click_url(
            &TrackingTarget {
                lead_id,
                workflow_id: None,
                campaign_id: None,
            },
            "https://site.example/a?b=c&d=e",
        );
        assert_eq!(
            url,
            format!(
                "https://crm.example.com/track/click?l={lead_id}&u=https%3A%2F%2Fsite.example%2Fa%3Fb%3Dc%26d%3De"
            )
        );
        assert!(links.is_tracking_url(&url));
    }

    #[test]
    fn test_open_url_carries_all_ids() {
        let links = TrackingLinks::new("http://localhost:8080");
        let (l, c, w) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let url = links.open_pixel_url(&TrackingTarget {
            lead_id: l,
            workflow_id: Some(w),
            campaign_id: Some(c),
        });
        assert_eq!(url, format!("http://localhost:8080/track/open?l={l}&c={c}&w={w}"));
    }

    fn campaign(tenant_id: Uuid) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Spring launch".to_string(),
            sent_count: 10,
            opened_count: 0,
            clicked_count: 0,
        }
    }

    #[tokio::test]
    async fn test_click_scores_lead_and_counts_for_campaign() {
        let h = Harness::new();
        let lead = seed_lead(&h, "click@example.com").await;
        let c = campaign(h.tenant_id);
        h.store.insert_campaign(c.clone()).await;

        let event = EmailEvent {
            kind: EmailEventKind::Click,
            lead_id: lead.id,
            campaign_id: Some(c.id),
            workflow_id: None,
            target_url: Some("https://site.example/listing".to_string()),
        };
        record_email_event(&h.services, &event, at(9, 0)).await.unwrap();

        let stored = h.store.find_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.lead_score, lead.lead_score + 3);
        let counted = h.store.campaign(c.id).await.unwrap();
        assert_eq!(counted.clicked_count, 1);
        assert_eq!(counted.opened_count, 0);

        let interactions = h.store.interactions_for_lead(lead.id).await.unwrap();
        let click = interactions
            .iter()
            .find(|i| i.interaction_type == InteractionType::EmailClick)
            .unwrap();
        assert_eq!(click.metadata["targetUrl"], "https://site.example/listing");
    }

    #[tokio::test]
    async fn test_foreign_campaign_is_not_counted() {
        let h = Harness::new();
        let lead = seed_lead(&h, "open@example.com").await;
        let c = campaign(Uuid::new_v4());
        h.store.insert_campaign(c.clone()).await;

        let event = EmailEvent {
            kind: EmailEventKind::Open,
            lead_id: lead.id,
            campaign_id: Some(c.id),
            workflow_id: None,
            target_url: None,
        };
        record_email_event(&h.services, &event, at(9, 0)).await.unwrap();

        assert_eq!(h.store.campaign(c.id).await.unwrap().opened_count, 0);
        let stored = h.store.find_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.lead_score, lead.lead_score + 1);
    }

    #[tokio::test]
    async fn test_unknown_lead_is_not_found() {
        let h = Harness::new();
        let event = EmailEvent {
            kind: EmailEventKind::Open,
            lead_id: Uuid::new_v4(),
            campaign_id: None,
            workflow_id: None,
            target_url: None,
        };
        let err = record_email_event(&h.services, &event, at(9, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
