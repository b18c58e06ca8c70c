use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookingReference {
    pub id: String,
    pub booking_id: i64,
    pub integration_type: String,
    pub external_uid: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_password: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct CreateBookingReference {
    pub booking_id: i64,
    pub integration_type: String,
    pub external_uid: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_password: Option<String>,
}
