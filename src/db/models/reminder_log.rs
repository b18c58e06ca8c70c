use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReminderType {
    AttendeeReminder,
}

impl ReminderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderType::AttendeeReminder => "attendee_reminder",
        }
    }
}

/// Marks that a reminder for (booking, type, lead time) was attempted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReminderLog {
    pub id: String,
    pub booking_id: i64,
    pub reminder_type: ReminderType,
    pub elapsed_minutes: i64,
    pub created_at: NaiveDateTime,
}
