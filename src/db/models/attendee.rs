use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attendee {
    pub id: i64,
    pub booking_id: i64,
    pub name: String,
    /// Always stored lower-cased.
    pub email: String,
    pub time_zone: String,
    /// Phone captured together with the SMS consent on the booking form.
    pub phone_number: Option<String>,
    pub sms_reminder_consent: bool,
}

impl Attendee {
    /// Phone number usable for SMS reminders without a directory lookup.
    pub fn consented_phone(&self) -> Option<&str> {
        if self.sms_reminder_consent {
            self.phone_number.as_deref().filter(|p| !p.trim().is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttendee {
    pub name: String,
    pub email: String,
    pub time_zone: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub sms_reminder_consent: bool,
}

/// Lower-case and trim an email address before it is stored or looked up.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[test]
    fn consented_phone_requires_consent() {
        let mut a = Attendee {
            id: 1,
            booking_id: 1,
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            time_zone: "UTC".to_string(),
            phone_number: Some("+15550001".to_string()),
            sms_reminder_consent: false,
        };
        assert_eq!(a.consented_phone(), None);
        a.sms_reminder_consent = true;
        assert_eq!(a.consented_phone(), Some("+15550001"));
        a.phone_number = Some("  ".to_string());
        assert_eq!(a.consented_phone(), None);
    }
}
