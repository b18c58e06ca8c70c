use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{BookingRepository, ReminderLogRepository, ReminderType, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::event::CalendarEvent;
use crate::services::notifications::{NotificationResult, NotificationService};
use crate::services::templates::NotificationKind;

/// Response of one scheduler run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunSummary {
    /// Organizer plus attendees, counted per reminded booking.
    pub notifications_sent: usize,
    pub responses: Vec<NotificationResult>,
}

/// Sends attendee reminders at fixed lead times before each confirmed booking.
///
/// A `reminder_logs` row per (booking, lead time) marks the reminder as
/// attempted; later runs skip it whether or not every send succeeded.
pub struct ReminderScheduler {
    pool: SqlitePool,
    lead_times_minutes: Vec<i64>,
    notifications: Arc<NotificationService>,
}

impl ReminderScheduler {
    pub fn new(
        pool: SqlitePool,
        lead_times_minutes: Vec<i64>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            pool,
            lead_times_minutes,
            notifications,
        }
    }

    pub fn lead_times_minutes(&self) -> &[i64] {
        &self.lead_times_minutes
    }

    pub async fn run(&self, now: NaiveDateTime) -> AppResult<ReminderRunSummary> {
        let mut summary = ReminderRunSummary::default();

        for &lead in &self.lead_times_minutes {
            self.run_lead_time(now, lead, &mut summary).await?;
        }

        tracing::info!(
            "Reminder run finished: notifications_sent={} responses={}",
            summary.notifications_sent,
            summary.responses.len()
        );
        Ok(summary)
    }

    async fn run_lead_time(
        &self,
        now: NaiveDateTime,
        lead: i64,
        summary: &mut ReminderRunSummary,
    ) -> AppResult<()> {
        let window_end = Duration::try_minutes(lead)
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(|| AppError::Config(format!("Reminder lead time out of range: {}m", lead)))?;

        let candidates =
            BookingRepository::find_confirmed_starting_between(&self.pool, now, window_end).await?;

        let ids: Vec<i64> = candidates.iter().map(|b| b.id).collect();
        let already: HashSet<i64> = ReminderLogRepository::find_for_bookings(
            &self.pool,
            ReminderType::AttendeeReminder,
            lead,
            &ids,
        )
        .await?
        .into_iter()
        .map(|log| log.booking_id)
        .collect();

        let due: Vec<_> = candidates
            .into_iter()
            .filter(|b| !already.contains(&b.id))
            .collect();

        tracing::debug!(
            "Lead time {}m: {} candidate booking(s), {} due",
            lead,
            ids.len(),
            due.len()
        );

        for booking in due {
            let organizer = UserRepository::find_by_id(&self.pool, &booking.user_id).await?;
            let organizer = match organizer {
                Some(u) if u.display_name().is_some() && u.time_zone.is_some() => u,
                other => {
                    tracing::error!(
                        "Booking booking_id={} is missing organizer name or time zone for reminder (organizer found: {})",
                        booking.id,
                        other.is_some()
                    );
                    continue;
                }
            };

            let event = CalendarEvent::from_booking(&booking, &organizer);
            let recipients = event.everyone();

            let sms = self
                .notifications
                .send_reminder_sms(&event, &booking.attendees, lead)
                .await;
            let emails = self
                .notifications
                .send_emails(NotificationKind::Reminder, &event, &recipients)
                .await;

            summary.responses.extend(emails);
            summary.responses.extend(sms);

            let recorded = ReminderLogRepository::record_attempt(
                &self.pool,
                booking.id,
                ReminderType::AttendeeReminder,
                lead,
            )
            .await?;
            if !recorded {
                tracing::warn!(
                    "Reminder for booking_id={} at {}m was recorded by a concurrent run",
                    booking.id,
                    lead
                );
            }

            summary.notifications_sent += recipients.len();
        }

        Ok(())
    }
}
