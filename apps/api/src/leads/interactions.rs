use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::lead::{InteractionType, LeadInteraction};
use crate::store::CrmStore;

/// Score added to a lead per interaction type. Types missing from the table weigh 0.
#[derive(Debug, Clone)]
pub struct InteractionWeights(HashMap<InteractionType, i32>);

impl Default for InteractionWeights {
    fn default() -> Self {
        Self(HashMap::from([
            (InteractionType::EmailOpen, 1),
            (InteractionType::EmailClick, 3),
            (InteractionType::PropertyView, 5),
            (InteractionType::FormSubmit, 20),
            (InteractionType::ChatInit, 10),
        ]))
    }
}

impl InteractionWeights {
    pub fn weight(&self, interaction_type: InteractionType) -> i32 {
        self.0.get(&interaction_type).copied().unwrap_or(0)
    }
}

/// How the caller identifies the lead being tracked.
#[derive(Debug, Clone)]
pub enum LeadRef {
    Id(Uuid),
    /// Resolves to the tenant's most recently created lead with this email.
    Email { tenant_id: Uuid, email: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracked {
    pub interaction: LeadInteraction,
    pub lead_score: i32,
}

/// Records an interaction and raises the lead score by its weight in one
/// atomic store call. `scope` restricts id lookups to a tenant.
pub async fn track_interaction(
    store: &dyn CrmStore,
    weights: &InteractionWeights,
    lead: LeadRef,
    scope: Option<Uuid>,
    interaction_type: InteractionType,
    metadata: Value,
    now: DateTime<Utc>,
) -> Result<Tracked, AppError> {
    let resolved = match &lead {
        LeadRef::Id(id) => store
            .find_lead(*id)
            .await?
            .filter(|l| scope.map_or(true, |tenant| l.tenant_id == tenant)),
        LeadRef::Email { tenant_id, email } => {
            store
                .find_latest_lead_by_email(*tenant_id, &email.trim().to_lowercase())
                .await?
        }
    };
    let lead = resolved.ok_or_else(|| AppError::NotFound(format!("No lead matches {lead:?}")))?;

    let metadata = match metadata {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let weight = weights.weight(interaction_type);
    let (interaction, lead_score) = store
        .record_interaction(lead.id, interaction_type, weight, &metadata, now)
        .await?;

    debug!(
        lead_id = %lead.id,
        kind = interaction_type.as_str(),
        weight,
        lead_score,
        "Interaction tracked"
    );
    Ok(Tracked {
        interaction,
        lead_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::lead::LeadCapture;
    use crate::store::memory::MemoryStore;
    use crate::testing::at;

    #[test]
    fn test_weight_table() {
        let w = InteractionWeights::default();
        assert_eq!(w.weight(InteractionType::EmailOpen), 1);
        assert_eq!(w.weight(InteractionType::EmailClick), 3);
        assert_eq!(w.weight(InteractionType::PropertyView), 5);
        assert_eq!(w.weight(InteractionType::FormSubmit), 20);
        assert_eq!(w.weight(InteractionType::ChatInit), 10);
        assert_eq!(w.weight(InteractionType::BookingRequest), 0);
        assert_eq!(w.weight(InteractionType::EmailSent), 0);
    }

    #[tokio::test]
    async fn test_score_equals_sum_of_weights() {
        let store = MemoryStore::new();
        let weights = InteractionWeights::default();
        let tenant = Uuid::new_v4();
        let lead = store
            .capture_lead(
                tenant,
                &LeadCapture {
                    email: Some("ada@example.com".to_string()),
                    ..Default::default()
                },
                at(8, 0),
            )
            .await
            .unwrap()
            .into_inner();

        let sequence = [
            InteractionType::EmailOpen,
            InteractionType::EmailClick,
            InteractionType::PropertyView,
            InteractionType::FormSubmit,
            InteractionType::ChatInit,
            InteractionType::UnitView,
            InteractionType::EmailOpen,
        ];
        let mut last = 0;
        for (i, kind) in sequence.iter().enumerate() {
            let tracked = track_interaction(
                &store,
                &weights,
                LeadRef::Id(lead.id),
                Some(tenant),
                *kind,
                Value::Null,
                at(9, i as u32),
            )
            .await
            .unwrap();
            assert_eq!(tracked.interaction.score_weight, weights.weight(*kind));
            last = tracked.lead_score;
        }

        let expected: i32 = sequence.iter().map(|k| weights.weight(*k)).sum();
        assert_eq!(expected, 40);
        assert_eq!(last, expected);
        assert_eq!(store.find_lead(lead.id).await.unwrap().unwrap().lead_score, expected);
        assert_eq!(store.interactions_for_lead(lead.id).await.unwrap().len(), sequence.len());
    }

    #[tokio::test]
    async fn test_email_resolves_most_recent_lead() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let older = store
            .capture_lead(
                tenant,
                &LeadCapture {
                    phone: Some("555-1".to_string()),
                    ..Default::default()
                },
                at(8, 0),
            )
            .await
            .unwrap()
            .into_inner();
        let newer = store
            .capture_lead(
                tenant,
                &LeadCapture {
                    email: Some("sam@example.com".to_string()),
                    ..Default::default()
                },
                at(8, 30),
            )
            .await
            .unwrap()
            .into_inner();
        assert_ne!(older.id, newer.id);

        let tracked = track_interaction(
            &store,
            &InteractionWeights::default(),
            LeadRef::Email {
                tenant_id: tenant,
                email: "Sam@Example.com".to_string(),
            },
            None,
            InteractionType::FormSubmit,
            json!({ "form": "contact" }),
            at(9, 0),
        )
        .await
        .unwrap();
        assert_eq!(tracked.interaction.lead_id, newer.id);
        assert_eq!(tracked.lead_score, 20);
    }

    #[tokio::test]
    async fn test_unknown_lead_is_not_found() {
        let store = MemoryStore::new();
        let result = track_interaction(
            &store,
            &InteractionWeights::default(),
            LeadRef::Id(Uuid::new_v4()),
            None,
            InteractionType::EmailOpen,
            Value::Null,
            at(9, 0),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
