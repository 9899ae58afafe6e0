use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub sent_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignCounter {
    Opened,
    Clicked,
}

impl CampaignCounter {
    pub fn column(&self) -> &'static str {
        match self {
            CampaignCounter::Opened => "opened_count",
            CampaignCounter::Clicked => "clicked_count",
        }
    }
}
