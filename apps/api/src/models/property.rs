use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub property_type: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: Uuid,
    pub property_id: Uuid,
    pub name: String,
    pub price: Option<f64>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyWithUnits {
    #[serde(flatten)]
    pub property: Property,
    pub units: Vec<Unit>,
}

impl PropertyWithUnits {
    pub fn cheapest_price(&self) -> Option<f64> {
        self.units
            .iter()
            .filter_map(|u| u.price)
            .fold(None, |min, p| Some(min.map_or(p, |m: f64| m.min(p))))
    }
}

/// Groups unit rows under their properties, keeping property order.
pub fn attach_units(properties: Vec<Property>, units: Vec<Unit>) -> Vec<PropertyWithUnits> {
    properties
        .into_iter()
        .map(|property| {
            let units = units
                .iter()
                .filter(|u| u.property_id == property.id)
                .cloned()
                .collect();
            PropertyWithUnits { property, units }
        })
        .collect()
}
