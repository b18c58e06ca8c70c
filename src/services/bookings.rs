use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{
    normalize_email, AttendeeRepository, Booking, BookingRepository, BookingStatus, CreateAttendee,
    CreateBookingRow, CreatePayment, CustomInputAnswer, EventType, EventTypeRepository,
    PaymentRepository, User, UserRepository,
};
use crate::error::{AppError, AppResult};
use crate::services::assignment::{pick_lucky_user, TieBreak};
use crate::services::dispatcher::{CalendarEventDispatcher, DispatchSummary};
use crate::services::event::CalendarEvent;
use crate::services::notifications::{NotificationResult, NotificationService};
use crate::services::templates::NotificationKind;

/// Booking request as submitted by the booking form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub event_type_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendees: Vec<CreateAttendee>,
    #[serde(default)]
    pub guests: Vec<String>,
    #[serde(default)]
    pub custom_inputs: Vec<CustomInputAnswer>,
    /// Processor payment intent for priced event types.
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// This call moved the booking and ran the follow-up effects.
    Applied,
    /// The booking was already in the requested state; nothing was done.
    AlreadyApplied,
}

/// What happened after a booking became confirmed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEffects {
    pub dispatch: Option<DispatchSummary>,
    pub notifications: Vec<NotificationResult>,
}

/// Booking state machine plus the side effects that follow each transition.
///
/// Transitions are decided by the conditional updates in `BookingRepository`;
/// only the caller whose update affected a row runs dispatch and notifications.
pub struct BookingService {
    pool: SqlitePool,
    tie_break: TieBreak,
    dispatcher: Arc<CalendarEventDispatcher>,
    notifications: Arc<NotificationService>,
}

impl BookingService {
    pub fn new(
        pool: SqlitePool,
        tie_break: TieBreak,
        dispatcher: Arc<CalendarEventDispatcher>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            pool,
            tie_break,
            dispatcher,
            notifications,
        }
    }

    pub async fn create(&self, input: CreateBooking) -> AppResult<Booking> {
        let event_type = EventTypeRepository::find_by_id(&self.pool, &input.event_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event type {}", input.event_type_id)))?;

        validate_request(&event_type, &input)?;
        let owner_id = self.select_owner(&event_type).await?;

        let row = CreateBookingRow {
            uid: Uuid::new_v4().to_string(),
            event_type_id: Some(event_type.id.clone()),
            user_id: owner_id,
            title: input
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| event_type.title.clone()),
            description: input.description.clone(),
            location: input
                .location
                .clone()
                .or_else(|| event_type.locations().into_iter().find_map(|l| l.address)),
            start_time: input.start_time.naive_utc(),
            end_time: input.end_time.naive_utc(),
            custom_inputs_json: serde_json::to_string(&input.custom_inputs)
                .map_err(|e| AppError::Internal(e.into()))?,
        };

        let booker_tz = input.attendees[0].time_zone.clone();
        let guests: Vec<CreateAttendee> = input
            .guests
            .iter()
            .map(|g| normalize_email(g))
            .filter(|g| !g.is_empty())
            .map(|email| CreateAttendee {
                name: email.clone(),
                email,
                time_zone: booker_tz.clone(),
                phone_number: None,
                sms_reminder_consent: false,
            })
            .collect();

        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::insert(&mut tx, row).await?;
        for attendee in input.attendees.iter().chain(guests.iter()) {
            AttendeeRepository::insert(&mut tx, booking.id, attendee).await?;
        }

        if event_type.is_paid() {
            let external_id = input
                .payment_intent_id
                .clone()
                .ok_or_else(|| AppError::Validation("payment_intent_id is required".to_string()))?;
            PaymentRepository::insert(
                &mut tx,
                CreatePayment {
                    external_id,
                    booking_id: booking.id,
                    amount: event_type.price,
                    currency: event_type.currency.clone(),
                },
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Created booking_id={} uid={} for event_type={} owner={}",
            booking.id,
            booking.uid,
            event_type.id,
            booking.user_id
        );

        if event_type.auto_accepts() {
            self.confirm(booking.id).await?;
        }

        self.load(booking.id).await
    }

    /// Pending -> Accepted by the organizer.
    pub async fn confirm(&self, booking_id: i64) -> AppResult<TransitionOutcome> {
        let booking = self.load(booking_id).await?;

        if BookingRepository::mark_accepted(&self.pool, booking_id).await? {
            tracing::info!("Booking booking_id={} accepted", booking_id);
            self.run_confirmation_effects(booking_id).await;
            return Ok(TransitionOutcome::Applied);
        }

        self.settle_lost_transition(booking, BookingStatus::Accepted).await
    }

    /// Pending -> Rejected by the organizer; attendees are told why.
    pub async fn reject(&self, booking_id: i64, reason: Option<&str>) -> AppResult<TransitionOutcome> {
        let booking = self.load(booking_id).await?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        if BookingRepository::mark_rejected(&self.pool, booking_id, reason).await? {
            tracing::info!("Booking booking_id={} rejected", booking_id);
            if let Err(e) = self
                .notify(booking_id, NotificationKind::Declined, false)
                .await
            {
                tracing::warn!("Failed to notify rejection for booking_id={}: {:?}", booking_id, e);
            }
            return Ok(TransitionOutcome::Applied);
        }

        self.settle_lost_transition(booking, BookingStatus::Rejected).await
    }

    /// Pending|Accepted -> Cancelled.
    pub async fn cancel(&self, booking_id: i64) -> AppResult<TransitionOutcome> {
        let booking = self.load(booking_id).await?;

        if BookingRepository::mark_cancelled(&self.pool, booking_id).await? {
            tracing::info!("Booking booking_id={} cancelled", booking_id);
            if let Err(e) = self
                .notify(booking_id, NotificationKind::Cancelled, true)
                .await
            {
                tracing::warn!(
                    "Failed to notify cancellation for booking_id={}: {:?}",
                    booking_id,
                    e
                );
            }
            return Ok(TransitionOutcome::Applied);
        }

        self.settle_lost_transition(booking, BookingStatus::Cancelled).await
    }

    /// Dispatch the calendar event, then send the "scheduled" email to everyone.
    ///
    /// Runs only for the caller that won the confirmation. Faults are logged and
    /// folded into the returned summary; the confirmed state is never rolled back.
    pub async fn run_confirmation_effects(&self, booking_id: i64) -> ConfirmationEffects {
        let mut effects = ConfirmationEffects::default();

        let (booking, organizer) = match self.load_with_organizer(booking_id).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    "Cannot run confirmation effects for booking_id={}: {:?}",
                    booking_id,
                    e
                );
                return effects;
            }
        };

        let event = CalendarEvent::from_booking(&booking, &organizer);
        match self.dispatcher.dispatch(&booking, &event).await {
            Ok(summary) => effects.dispatch = Some(summary),
            Err(e) => tracing::error!(
                "BookingCreatingMeetingFailed: dispatch aborted for booking_id={}: {:?}",
                booking_id,
                e
            ),
        }

        // Reload so the email carries the meeting link just created.
        let event = match self.load(booking_id).await {
            Ok(b) => CalendarEvent::from_booking(&b, &organizer),
            Err(_) => event,
        };
        effects.notifications = self
            .notifications
            .send_emails(NotificationKind::Scheduled, &event, &event.everyone())
            .await;

        effects
    }

    /// Operator retry of calendar dispatch for an accepted booking.
    pub async fn redispatch(&self, booking_id: i64) -> AppResult<DispatchSummary> {
        let (booking, organizer) = self.load_with_organizer(booking_id).await?;
        if booking.status != BookingStatus::Accepted {
            return Err(AppError::Conflict(format!(
                "Booking {} is {}, only accepted bookings can be dispatched",
                booking_id, booking.status
            )));
        }
        let event = CalendarEvent::from_booking(&booking, &organizer);
        self.dispatcher.dispatch(&booking, &event).await
    }

    /// Re-send reminder emails to the organizer and attendees. The reminder log is untouched.
    pub async fn resend_reminder(&self, uid: &str) -> AppResult<Vec<NotificationResult>> {
        let booking = BookingRepository::find_by_uid(&self.pool, uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {}", uid)))?;
        let organizer = self.organizer_of(&booking).await?;
        let event = CalendarEvent::from_booking(&booking, &organizer);

        Ok(self
            .notifications
            .send_emails(NotificationKind::Reminder, &event, &event.everyone())
            .await)
    }

    async fn notify(
        &self,
        booking_id: i64,
        kind: NotificationKind,
        include_organizer: bool,
    ) -> AppResult<Vec<NotificationResult>> {
        let (booking, organizer) = self.load_with_organizer(booking_id).await?;
        let event = CalendarEvent::from_booking(&booking, &organizer);
        let recipients = if include_organizer {
            event.everyone()
        } else {
            event.attendees.clone()
        };
        Ok(self.notifications.send_emails(kind, &event, &recipients).await)
    }

    /// The conditional update changed nothing: decide between "already there" and illegal.
    async fn settle_lost_transition(
        &self,
        before: Booking,
        to: BookingStatus,
    ) -> AppResult<TransitionOutcome> {
        // Re-read: a concurrent writer may have moved the booking since `before`.
        let current = self.load(before.id).await?.status;
        if current == to {
            tracing::debug!("Booking booking_id={} already {}", before.id, to);
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        Err(AppError::InvalidTransition { from: current, to })
    }

    async fn select_owner(&self, event_type: &EventType) -> AppResult<String> {
        if event_type.is_round_robin() {
            let hosts = EventTypeRepository::find_hosts(&self.pool, &event_type.id).await?;
            let ids: Vec<String> = hosts.iter().map(|h| h.id.clone()).collect();
            let counts =
                BookingRepository::count_accepted_by_user(&self.pool, &event_type.id, &ids).await?;

            let candidates: Vec<(String, i64)> = ids
                .into_iter()
                .map(|id| {
                    let count = counts.get(&id).copied().unwrap_or(0);
                    (id, count)
                })
                .collect();

            let lucky = pick_lucky_user(&candidates, self.tie_break)?;
            tracing::debug!(
                "Round-robin assignment for event_type={} picked {}",
                event_type.id,
                lucky
            );
            return Ok(lucky);
        }

        event_type
            .owner_user_id
            .clone()
            .ok_or_else(|| AppError::Validation(format!("Event type {} has no owner", event_type.id)))
    }

    async fn load(&self, booking_id: i64) -> AppResult<Booking> {
        BookingRepository::find_by_id(&self.pool, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {}", booking_id)))
    }

    async fn organizer_of(&self, booking: &Booking) -> AppResult<User> {
        UserRepository::find_by_id(&self.pool, &booking.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", booking.user_id)))
    }

    async fn load_with_organizer(&self, booking_id: i64) -> AppResult<(Booking, User)> {
        let booking = self.load(booking_id).await?;
        let organizer = self.organizer_of(&booking).await?;
        Ok((booking, organizer))
    }
}

fn validate_request(event_type: &EventType, input: &CreateBooking) -> AppResult<()> {
    if input.end_time <= input.start_time {
        return Err(AppError::Validation("endTime must be after startTime".to_string()));
    }
    if input.attendees.is_empty() {
        return Err(AppError::Validation("At least one attendee is required".to_string()));
    }
    for attendee in &input.attendees {
        let email = normalize_email(&attendee.email);
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation(format!(
                "Invalid attendee email: {}",
                attendee.email
            )));
        }
        if attendee.name.trim().is_empty() {
            return Err(AppError::Validation("Attendee name is required".to_string()));
        }
    }
    if !input.guests.is_empty() && event_type.disable_guests {
        return Err(AppError::Validation("Guests are not allowed for this event type".to_string()));
    }
    for guest in &input.guests {
        if !normalize_email(guest).contains('@') {
            return Err(AppError::Validation(format!("Invalid guest email: {}", guest)));
        }
    }
    for required in event_type.custom_inputs().iter().filter(|c| c.required) {
        let answered = input
            .custom_inputs
            .iter()
            .any(|a| a.label == required.label && !a.value.trim().is_empty());
        if !answered {
            return Err(AppError::Validation(format!(
                "Missing required input: {}",
                required.label
            )));
        }
    }
    if event_type.is_paid()
        && input
            .payment_intent_id
            .as_deref()
            .map_or(true, |p| p.trim().is_empty())
    {
        return Err(AppError::Validation(
            "paymentIntentId is required for paid event types".to_string(),
        ));
    }
    Ok(())
}
