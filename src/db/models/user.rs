use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub time_zone: Option<String>,
    pub locale: Option<String>,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

/// Provider credential configured by an organizer (one per calendar/video integration).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub user_id: String,
    pub integration_type: String,
    pub key_json: String,
    pub created_at: NaiveDateTime,
}
