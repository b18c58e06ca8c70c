use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::{Attendee, Booking, CustomInputAnswer, User};
use crate::i18n;

/// A named participant with the time zone their notifications are rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    pub email: String,
    pub time_zone: String,
}

impl From<&Attendee> for Person {
    fn from(a: &Attendee) -> Self {
        Person {
            name: a.name.clone(),
            email: a.email.clone(),
            time_zone: a.time_zone.clone(),
        }
    }
}

/// Provider-neutral description of a booking, shared by calendar integrations
/// and notification templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub booking_id: i64,
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub organizer: Person,
    pub attendees: Vec<Person>,
    pub custom_inputs: Vec<CustomInputAnswer>,
    pub meeting_url: Option<String>,
    pub meeting_password: Option<String>,
    pub rejection_reason: Option<String>,
    /// Organizer's language, used for every recipient.
    pub language: String,
}

impl CalendarEvent {
    pub fn from_booking(booking: &Booking, organizer: &User) -> Self {
        let organizer_name = organizer
            .display_name()
            .map(str::to_string)
            .unwrap_or_else(|| organizer.email.clone());

        let first_reference = booking.references.iter().find(|r| r.meeting_url.is_some());

        CalendarEvent {
            booking_id: booking.id,
            uid: booking.uid.clone(),
            title: booking.title.clone(),
            description: booking.description.clone(),
            location: booking.location.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
            organizer: Person {
                name: organizer_name,
                email: organizer.email.clone(),
                time_zone: organizer
                    .time_zone
                    .clone()
                    .unwrap_or_else(|| "UTC".to_string()),
            },
            attendees: booking.attendees.iter().map(Person::from).collect(),
            custom_inputs: serde_json::from_str(&booking.custom_inputs_json).unwrap_or_default(),
            meeting_url: first_reference.and_then(|r| r.meeting_url.clone()),
            meeting_password: first_reference.and_then(|r| r.meeting_password.clone()),
            rejection_reason: booking.rejection_reason.clone(),
            language: i18n::resolve_language(organizer.locale.as_deref()),
        }
    }

    /// Organizer first, then attendees in booking order.
    pub fn everyone(&self) -> Vec<Person> {
        std::iter::once(self.organizer.clone())
            .chain(self.attendees.iter().cloned())
            .collect()
    }
}
