use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::lead::{Lead, LeadCapture, LeadStatus};
use crate::store::CrmStore;

#[derive(Debug, Serialize)]
pub struct Captured {
    pub lead: Lead,
    pub created: bool,
}

/// Creates a lead, or re-engages the tenant's existing lead with the same
/// email or phone.
pub async fn capture_lead(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    capture: LeadCapture,
    now: DateTime<Utc>,
) -> Result<Captured, AppError> {
    let capture = capture.normalized();
    if !capture.has_contact() {
        return Err(AppError::Validation(
            "either email or phone is required".to_string(),
        ));
    }

    let outcome = store.capture_lead(tenant_id, &capture, now).await?;
    let created = outcome.is_created();
    let lead = outcome.into_inner();

    if created {
        info!(lead_id = %lead.id, %tenant_id, "Lead captured");
    } else {
        info!(lead_id = %lead.id, %tenant_id, "Existing lead re-engaged");
    }
    Ok(Captured { lead, created })
}

/// Loads a lead that must belong to `tenant_id`; other tenants' leads read as absent.
pub async fn load_tenant_lead(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    lead_id: Uuid,
) -> Result<Lead, AppError> {
    store
        .find_lead(lead_id)
        .await?
        .filter(|l| l.tenant_id == tenant_id)
        .ok_or_else(|| AppError::NotFound(format!("Lead {lead_id} not found")))
}

pub async fn update_lead_status(
    store: &dyn CrmStore,
    tenant_id: Uuid,
    lead_id: Uuid,
    status: LeadStatus,
    now: DateTime<Utc>,
) -> Result<Lead, AppError> {
    load_tenant_lead(store, tenant_id, lead_id).await?;
    store
        .update_lead_status(lead_id, status, now)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {lead_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::testing::at;

    fn form(email: &str, message: &str) -> LeadCapture {
        LeadCapture {
            name: Some("Grace".to_string()),
            email: Some(email.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_same_email_twice_yields_one_lead() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();

        let first = capture_lead(&store, tenant, form("grace@navy.mil", "Hello"), at(9, 0))
            .await
            .unwrap();
        let second = capture_lead(&store, tenant, form(" GRACE@navy.mil ", "Again"), at(10, 0))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.lead.id, second.lead.id);
        assert_eq!(store.lead_count().await, 1);
        assert_eq!(second.lead.updated_at, at(10, 0));
        let notes = second.lead.notes.unwrap();
        assert!(notes.contains("Hello"));
        assert!(notes.ends_with("Again"));
    }

    #[tokio::test]
    async fn test_phone_match_dedups_within_tenant_only() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let by_phone = |name: &str| LeadCapture {
            name: Some(name.to_string()),
            phone: Some("+1 555 0100".to_string()),
            ..Default::default()
        };

        let first = capture_lead(&store, a, by_phone("One"), at(9, 0)).await.unwrap();
        let same_tenant = capture_lead(&store, a, by_phone("Two"), at(9, 5)).await.unwrap();
        let other_tenant = capture_lead(&store, b, by_phone("Three"), at(9, 10)).await.unwrap();

        assert_eq!(same_tenant.lead.id, first.lead.id);
        assert!(other_tenant.created);
        assert_eq!(store.lead_count().await, 2);
    }

    #[tokio::test]
    async fn test_capture_without_contact_is_rejected() {
        let store = MemoryStore::new();
        let result = capture_lead(
            &store,
            Uuid::new_v4(),
            LeadCapture {
                name: Some("Nobody".to_string()),
                email: Some("  ".to_string()),
                ..Default::default()
            },
            at(9, 0),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(store.lead_count().await, 0);
    }

    #[tokio::test]
    async fn test_status_update_is_tenant_scoped() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let lead = capture_lead(&store, tenant, form("a@b.co", "hi"), at(9, 0))
            .await
            .unwrap()
            .lead;

        let foreign =
            update_lead_status(&store, Uuid::new_v4(), lead.id, LeadStatus::Lost, at(9, 1)).await;
        assert!(matches!(foreign, Err(AppError::NotFound(_))));

        let updated = update_lead_status(&store, tenant, lead.id, LeadStatus::Qualified, at(9, 2))
            .await
            .unwrap();
        assert_eq!(updated.status, LeadStatus::Qualified);
    }
}
