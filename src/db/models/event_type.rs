use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SchedulingType {
    RoundRobin,
    Collective,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventType {
    pub id: String,
    pub owner_user_id: Option<String>,
    pub slug: String,
    pub title: String,
    pub length_minutes: i64,
    /// Price in the currency's minor unit; zero means free.
    pub price: i64,
    pub currency: String,
    pub locations_json: String,
    pub custom_inputs_json: String,
    pub disable_guests: bool,
    pub requires_confirmation: bool,
    pub scheduling_type: Option<SchedulingType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInputDefinition {
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOption {
    #[serde(rename = "type")]
    pub location_type: String,
    #[serde(default)]
    pub address: Option<String>,
}

impl EventType {
    pub fn is_paid(&self) -> bool {
        self.price > 0
    }

    /// Free events without manual confirmation are accepted on creation.
    pub fn auto_accepts(&self) -> bool {
        !self.is_paid() && !self.requires_confirmation
    }

    pub fn is_round_robin(&self) -> bool {
        self.scheduling_type == Some(SchedulingType::RoundRobin)
    }

    pub fn custom_inputs(&self) -> Vec<CustomInputDefinition> {
        serde_json::from_str(&self.custom_inputs_json).unwrap_or_default()
    }

    pub fn locations(&self) -> Vec<LocationOption> {
        serde_json::from_str(&self.locations_json).unwrap_or_default()
    }
}
