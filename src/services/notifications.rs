use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{Attendee, CreateNotificationLog, NotificationLogRepository};
use crate::error::AppResult;
use crate::services::event::{CalendarEvent, Person};
use crate::services::templates::{self, NotificationKind};

pub const CHANNEL_EMAIL: &str = "email";
pub const CHANNEL_SMS: &str = "sms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to_phone: String,
    /// Recipient's email, forwarded so the gateway can correlate the message.
    pub email: String,
    pub body: String,
}

#[async_trait]
pub trait EmailGateway: Send + Sync + 'static {
    async fn send_email(&self, message: &EmailMessage) -> AppResult<()>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync + 'static {
    async fn send_sms(&self, message: &SmsMessage) -> AppResult<()>;
}

/// Read-only lookup of a phone number the person agreed to receive SMS on.
#[async_trait]
pub trait PhoneDirectory: Send + Sync + 'static {
    async fn find_opted_in_phone(&self, email: &str) -> AppResult<Option<String>>;
}

/// Result of a notification send attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResult {
    pub channel: String,
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

impl NotificationResult {
    fn from_attempt(channel: &str, recipient: &str, res: AppResult<()>) -> Self {
        match res {
            Ok(()) => NotificationResult {
                channel: channel.to_string(),
                recipient: recipient.to_string(),
                success: true,
                error: None,
            },
            Err(e) => NotificationResult {
                channel: channel.to_string(),
                recipient: recipient.to_string(),
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Sends rendered notifications and records every attempt in `notification_history`.
///
/// Sends never fail as a batch: each recipient yields its own [`NotificationResult`].
#[derive(Clone)]
pub struct NotificationService {
    pool: SqlitePool,
    email: Arc<dyn EmailGateway>,
    sms: Arc<dyn SmsGateway>,
    directory: Arc<dyn PhoneDirectory>,
}

impl NotificationService {
    pub fn new(
        pool: SqlitePool,
        email: Arc<dyn EmailGateway>,
        sms: Arc<dyn SmsGateway>,
        directory: Arc<dyn PhoneDirectory>,
    ) -> Self {
        Self {
            pool,
            email,
            sms,
            directory,
        }
    }

    /// Email every recipient concurrently; one recipient's failure does not affect the others.
    pub async fn send_emails(
        &self,
        kind: NotificationKind,
        event: &CalendarEvent,
        recipients: &[Person],
    ) -> Vec<NotificationResult> {
        let sends = recipients.iter().map(|recipient| async move {
            let rendered = templates::render_email(kind, event, recipient);
            let message = EmailMessage {
                to_name: recipient.name.clone(),
                to_email: recipient.email.clone(),
                subject: rendered.subject,
                text: rendered.text,
                html: rendered.html,
            };

            let res = self.email.send_email(&message).await;
            if let Err(e) = &res {
                tracing::warn!(
                    "Failed to send {} email for booking_id={} to {}: {}",
                    kind.as_str(),
                    event.booking_id,
                    recipient.email,
                    e
                );
            }

            let result = NotificationResult::from_attempt(CHANNEL_EMAIL, &recipient.email, res);
            self.log_notification(event.booking_id, kind, &result, &message.subject)
                .await;
            result
        });

        join_all(sends).await
    }

    /// SMS reminders for attendees with an opted-in phone.
    ///
    /// The phone captured with the booking wins; otherwise the directory is asked.
    /// Attendees without a phone are skipped silently, as is everyone when the
    /// event has no meeting link.
    pub async fn send_reminder_sms(
        &self,
        event: &CalendarEvent,
        attendees: &[Attendee],
        lead_minutes: i64,
    ) -> Vec<NotificationResult> {
        if event.meeting_url.is_none() {
            tracing::debug!(
                "Skipping SMS reminders for booking_id={}: no meeting link",
                event.booking_id
            );
            return Vec::new();
        }

        let mut results = Vec::new();

        for attendee in attendees {
            let phone = match attendee.consented_phone() {
                Some(phone) => Some(phone.to_string()),
                None => match self.directory.find_opted_in_phone(&attendee.email).await {
                    Ok(phone) => phone,
                    Err(e) => {
                        tracing::warn!(
                            "Phone directory lookup failed for {} (booking_id={}): {}",
                            attendee.email,
                            event.booking_id,
                            e
                        );
                        results.push(NotificationResult::from_attempt(
                            CHANNEL_SMS,
                            &attendee.email,
                            Err(e),
                        ));
                        continue;
                    }
                },
            };

            let Some(phone) = phone else {
                continue;
            };

            let person = Person::from(attendee);
            let Some(body) = templates::render_reminder_sms(event, &person, lead_minutes) else {
                continue;
            };

            let message = SmsMessage {
                to_phone: phone,
                email: attendee.email.clone(),
                body,
            };
            let res = self.sms.send_sms(&message).await;
            if let Err(e) = &res {
                tracing::warn!(
                    "Failed to send reminder SMS for booking_id={} to {}: {}",
                    event.booking_id,
                    attendee.email,
                    e
                );
            }

            let result = NotificationResult::from_attempt(CHANNEL_SMS, &message.to_phone, res);
            self.log_notification(event.booking_id, NotificationKind::Reminder, &result, &message.body)
                .await;
            results.push(result);
        }

        results
    }

    async fn log_notification(
        &self,
        booking_id: i64,
        kind: NotificationKind,
        result: &NotificationResult,
        subject: &str,
    ) {
        let log = CreateNotificationLog {
            booking_id,
            notification_kind: kind.as_str().to_string(),
            channel: result.channel.clone(),
            recipient: result.recipient.clone(),
            subject: subject.to_string(),
            status: if result.success { "sent" } else { "failed" }.to_string(),
            error_message: result.error.clone(),
        };

        if let Err(e) = NotificationLogRepository::create(&self.pool, log).await {
            tracing::warn!(
                "Failed to record notification history for booking_id={}: {:?}",
                booking_id,
                e
            );
        }
    }
}
