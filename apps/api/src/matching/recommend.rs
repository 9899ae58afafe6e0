use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::capture::load_tenant_lead;
use crate::matching::preferences::{BUDGET_KEY, LOCATIONS_KEY, TYPES_KEY};
use crate::models::lead::Lead;
use crate::models::property::PropertyWithUnits;
use crate::store::{CandidateQuery, CrmStore};

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 50;
/// Extra candidates fetched before scoring so truncation sees a wider pool.
const OVERFETCH: usize = 5;

/// Points awarded per matched criterion.
#[derive(Debug, Clone, Copy)]
pub struct MatchWeights {
    pub baseline: u32,
    pub location: u32,
    pub property_type: u32,
    pub budget: u32,
    pub max: u32,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            baseline: 10,
            location: 40,
            property_type: 30,
            budget: 20,
            max: 100,
        }
    }
}

/// What a lead is matched against. Locations and types are lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProfile {
    pub locations: Vec<String>,
    pub types: Vec<String>,
    pub budget: f64,
}

impl MatchProfile {
    pub fn for_lead(lead: &Lead, default_ceiling: f64) -> Self {
        let strings = |key: &str| -> Vec<String> {
            lead.preferences
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };
        let suggested = lead.preferences.get(BUDGET_KEY).and_then(Value::as_f64);
        let budget = lead
            .budget
            .filter(|b| *b > 0.0)
            .or(suggested.filter(|b| *b > 0.0))
            .unwrap_or(default_ceiling);

        Self {
            locations: strings(LOCATIONS_KEY),
            types: strings(TYPES_KEY),
            budget,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(flatten)]
    pub property: PropertyWithUnits,
    pub match_score: u32,
}

pub fn score_property(
    profile: &MatchProfile,
    candidate: &PropertyWithUnits,
    weights: &MatchWeights,
) -> u32 {
    let lower = |v: &Option<String>| v.as_deref().map(|s| s.trim().to_lowercase());
    let city = lower(&candidate.property.city).is_some_and(|c| profile.locations.contains(&c));
    let kind =
        lower(&candidate.property.property_type).is_some_and(|t| profile.types.contains(&t));
    let affordable = candidate
        .cheapest_price()
        .is_some_and(|price| price <= profile.budget);

    if !(city || kind || affordable) {
        return 0;
    }
    let mut score = weights.baseline;
    if city {
        score += weights.location;
    }
    if kind {
        score += weights.property_type;
    }
    if affordable {
        score += weights.budget;
    }
    score.min(weights.max)
}

/// Ranks the tenant's available properties for a lead, best first.
pub async fn get_recommendations(
    store: &dyn CrmStore,
    weights: &MatchWeights,
    tenant_id: Uuid,
    lead_id: Uuid,
    limit: usize,
    default_ceiling: f64,
) -> Result<Vec<Recommendation>, AppError> {
    let lead = load_tenant_lead(store, tenant_id, lead_id).await?;
    let profile = MatchProfile::for_lead(&lead, default_ceiling);
    let limit = limit.clamp(1, MAX_LIMIT);

    let candidates = store
        .candidate_properties(&CandidateQuery {
            tenant_id,
            cities: profile.locations.clone(),
            property_types: profile.types.clone(),
            max_price: profile.budget,
            limit: (limit + OVERFETCH) as i64,
        })
        .await?;

    let mut ranked: Vec<Recommendation> = candidates
        .into_iter()
        .map(|property| Recommendation {
            match_score: score_property(&profile, &property, weights),
            property,
        })
        .filter(|r| r.match_score > 0)
        .collect();
    ranked.sort_by(|a, b| b.match_score.cmp(&a.match_score));
    ranked.truncate(limit);
    Ok(ranked)
}
