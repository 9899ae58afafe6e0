//! Implicit preference inference from browsing history.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::lead::{InteractionType, LeadInteraction};
use crate::models::property::PropertyWithUnits;
use crate::store::CrmStore;

/// Interaction types that reveal interest in a specific property.
pub const PREFERENCE_SIGNALS: [InteractionType; 4] = [
    InteractionType::PropertyView,
    InteractionType::FormSubmit,
    InteractionType::ChatInit,
    InteractionType::UnitView,
];

/// How many recent signals are considered.
pub const SIGNAL_WINDOW: i64 = 20;

/// Headroom applied to the average observed price.
pub const BUDGET_HEADROOM: f64 = 1.2;

pub const LOCATIONS_KEY: &str = "interpretedLocations";
pub const TYPES_KEY: &str = "interpretedTypes";
pub const BUDGET_KEY: &str = "suggestedMaxBudget";
pub const PROCESSED_AT_KEY: &str = "lastProcessedAt";

#[derive(Debug, Clone, PartialEq)]
pub struct InferredPreferences {
    pub locations: Vec<String>,
    pub types: Vec<String>,
    pub suggested_max_budget: Option<f64>,
}

pub fn is_preference_signal(interaction: &LeadInteraction) -> bool {
    PREFERENCE_SIGNALS.contains(&interaction.interaction_type)
        && property_id_of(interaction).is_some()
}

fn property_id_of(interaction: &LeadInteraction) -> Option<Uuid> {
    interaction
        .metadata
        .get("propertyId")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Appends `value` unless an entry equal ignoring case is already present.
fn push_distinct(values: &mut Vec<String>, value: Option<&str>) {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        values.push(value.to_string());
    }
}

pub fn infer_preferences(properties: &[PropertyWithUnits]) -> InferredPreferences {
    let mut locations = Vec::new();
    let mut types = Vec::new();
    let mut prices = Vec::new();

    for p in properties {
        push_distinct(&mut locations, p.property.city.as_deref());
        push_distinct(&mut types, p.property.property_type.as_deref());
        prices.extend(p.units.iter().filter_map(|u| u.price));
    }

    let suggested_max_budget = (!prices.is_empty()).then(|| {
        let average = prices.iter().sum::<f64>() / prices.len() as f64;
        (average * BUDGET_HEADROOM * 100.0).round() / 100.0
    });

    InferredPreferences {
        locations,
        types,
        suggested_max_budget,
    }
}

/// Writes the inferred keys into `existing`, leaving every other key as it was.
pub fn merge_preferences(
    existing: &Value,
    inferred: &InferredPreferences,
    now: DateTime<Utc>,
) -> Value {
    let mut map = match existing {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    map.insert(LOCATIONS_KEY.to_string(), json!(inferred.locations));
    map.insert(TYPES_KEY.to_string(), json!(inferred.types));
    if let Some(budget) = inferred.suggested_max_budget {
        map.insert(BUDGET_KEY.to_string(), json!(budget));
    }
    map.insert(PROCESSED_AT_KEY.to_string(), json!(now.to_rfc3339()));
    Value::Object(map)
}

/// Refreshes the lead's interpreted preferences. Returns the new preferences,
/// or `None` when there is no property signal to learn from.
pub async fn update_lead_preferences(
    store: &dyn CrmStore,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Value>, AppError> {
    let lead = store
        .find_lead(lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {lead_id} not found")))?;

    let signals = store
        .recent_property_interactions(lead_id, &PREFERENCE_SIGNALS, SIGNAL_WINDOW)
        .await?;
    let mut property_ids: Vec<Uuid> = Vec::new();
    for id in signals.iter().filter_map(property_id_of) {
        if !property_ids.contains(&id) {
            property_ids.push(id);
        }
    }
    if property_ids.is_empty() {
        debug!(%lead_id, "No property signals, preferences unchanged");
        return Ok(None);
    }

    let properties: Vec<PropertyWithUnits> = store
        .properties_with_units(&property_ids)
        .await?
        .into_iter()
        .filter(|p| p.property.tenant_id == lead.tenant_id)
        .collect();
    if properties.is_empty() {
        return Ok(None);
    }

    let inferred = infer_preferences(&properties);
    let merged = merge_preferences(&lead.preferences, &inferred, now);
    store.update_lead_preferences(lead_id, &merged, now).await?;
    debug!(%lead_id, ?inferred, "Lead preferences refreshed");
    Ok(Some(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{at, property, seed_lead, unit, Harness};

    #[test]
    fn test_infer_dedups_case_insensitively_and_adds_headroom() {
        let tenant = Uuid::new_v4();
        let a = property(tenant, "A", "Lisbon", "office", at(1, 0));
        let b = property(tenant, "B", "lisbon", "Desk", at(1, 0));
        let with_units = vec![
            PropertyWithUnits {
                units: vec![unit(a.id, Some(100.0), true), unit(a.id, Some(300.0), false)],
                property: a,
            },
            PropertyWithUnits {
                units: vec![unit(b.id, Some(200.0), true), unit(b.id, None, true)],
                property: b,
            },
        ];

        let inferred = infer_preferences(&with_units);
        assert_eq!(inferred.locations, vec!["Lisbon"]);
        assert_eq!(inferred.types, vec!["office", "Desk"]);
        assert_eq!(inferred.suggested_max_budget, Some(240.0));
    }

    #[test]
    fn test_merge_keeps_unrelated_keys() {
        let existing = json!({ "newsletter": true, "interpretedTypes": ["old"] });
        let merged = merge_preferences(
            &existing,
            &InferredPreferences {
                locations: vec!["Porto".to_string()],
                types: vec!["studio".to_string()],
                suggested_max_budget: None,
            },
            at(12, 0),
        );
        assert_eq!(merged["newsletter"], json!(true));
        assert_eq!(merged[TYPES_KEY], json!(["studio"]));
        assert_eq!(merged[LOCATIONS_KEY], json!(["Porto"]));
        assert!(merged.get(BUDGET_KEY).is_none());
        assert!(merged[PROCESSED_AT_KEY].is_string());
    }

    #[tokio::test]
    async fn test_update_reads_recent_property_views() {
        let h = Harness::new();
        let lead = seed_lead(&h, "p@example.com").await;
        let office = property(h.tenant_id, "Office", "Berlin", "office", at(1, 0));
        h.store.insert_unit(unit(office.id, Some(500.0), true)).await;
        h.store.insert_unit(unit(office.id, Some(1500.0), true)).await;
        h.store.insert_property(office.clone()).await;

        h.store
            .record_interaction(
                lead.id,
                InteractionType::PropertyView,
                5,
                &json!({ "propertyId": office.id.to_string() }),
                at(9, 0),
            )
            .await
            .unwrap();
        h.store
            .record_interaction(lead.id, InteractionType::EmailOpen, 1, &json!({}), at(9, 1))
            .await
            .unwrap();

        let merged = update_lead_preferences(h.store.as_ref(), lead.id, at(10, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged[LOCATIONS_KEY], json!(["Berlin"]));
        assert_eq!(merged[BUDGET_KEY], json!(1200.0));

        let stored = h.store.find_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.preferences, merged);
    }

    #[tokio::test]
    async fn test_update_without_signals_is_a_no_op() {
        let h = Harness::new();
        let lead = seed_lead(&h, "p@example.com").await;
        let result = update_lead_preferences(h.store.as_ref(), lead.id, at(10, 0))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            h.store.find_lead(lead.id).await.unwrap().unwrap().preferences,
            json!({})
        );
    }
}
