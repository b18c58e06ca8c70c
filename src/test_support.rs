//! Test-only fixtures: an in-memory database, seeders and recording fakes
//! for the gateways and calendar integrations.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{
    AttendeeRepository, BookingRepository, CreateAttendee, CreateBookingRow, CreatePayment,
    EventType, EventTypeRepository, PaymentRepository, UserRepository,
};
use crate::error::{AppError, AppResult};
use crate::services::assignment::TieBreak;
use crate::services::bookings::BookingService;
use crate::services::dispatcher::CalendarEventDispatcher;
use crate::services::event::CalendarEvent;
use crate::services::integrations::{CalendarIntegration, CreatedEvent, IntegrationProvider};
use crate::services::notifications::{
    EmailGateway, EmailMessage, NotificationService, PhoneDirectory, SmsGateway, SmsMessage,
};
use crate::services::payments::PaymentConfirmationHandler;
use crate::services::reminders::ReminderScheduler;
use crate::AppState;

pub const ORGANIZER_ID: &str = "user-olga";

/// Single-connection in-memory pool with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub struct Seeded {
    pub booking_id: i64,
    pub uid: String,
    pub user_id: String,
    pub event_type_id: String,
}

async fn ensure_user(pool: &SqlitePool, id: &str, email: &str, name: &str, time_zone: &str) {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, time_zone, locale)
        VALUES (?, ?, ?, ?, 'en')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(time_zone)
    .execute(pool)
    .await
    .unwrap();
}

async fn ensure_organizer(pool: &SqlitePool) {
    ensure_user(pool, ORGANIZER_ID, "olga@example.com", "Olga", "Europe/Moscow").await;
}

async fn insert_event_type(
    pool: &SqlitePool,
    slug: &str,
    owner: Option<&str>,
    price: i64,
    requires_confirmation: bool,
    scheduling_type: Option<&str>,
) -> EventType {
    let id = format!("et-{}", Uuid::new_v4());
    sqlx::query(
        r#"
        INSERT INTO event_types (
            id, owner_user_id, slug, title, length_minutes, price, currency,
            locations_json, custom_inputs_json, disable_guests, requires_confirmation,
            scheduling_type
        )
        VALUES (?, ?, ?, ?, 30, ?, 'usd', '[]', '[]', 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(owner)
    .bind(slug)
    .bind(format!("{} call", slug))
    .bind(price)
    .bind(requires_confirmation)
    .bind(scheduling_type)
    .execute(pool)
    .await
    .unwrap();

    EventTypeRepository::find_by_id(pool, &id)
        .await
        .unwrap()
        .unwrap()
}

/// Event type owned by the default organizer; guests are disabled.
pub async fn seed_event_type(
    pool: &SqlitePool,
    slug: &str,
    price: i64,
    requires_confirmation: bool,
) -> EventType {
    ensure_organizer(pool).await;
    insert_event_type(pool, slug, Some(ORGANIZER_ID), price, requires_confirmation, None).await
}

/// Free auto-accept round-robin event type with the given hosts, in order.
pub async fn seed_round_robin(pool: &SqlitePool, host_ids: &[&str]) -> EventType {
    let et = insert_event_type(pool, "team", None, 0, false, Some("round_robin")).await;
    for (position, host) in host_ids.iter().enumerate() {
        ensure_user(pool, host, &format!("{}@example.com", host), host, "UTC").await;
        sqlx::query(
            "INSERT INTO event_type_hosts (event_type_id, user_id, position) VALUES (?, ?, ?)",
        )
        .bind(&et.id)
        .bind(host)
        .bind(position as i64)
        .execute(pool)
        .await
        .unwrap();
    }
    et
}

async fn insert_pending_booking(pool: &SqlitePool, et: &EventType, minutes_until_start: i64) -> (i64, String) {
    let start = Utc::now().naive_utc() + Duration::minutes(minutes_until_start);
    let mut tx = pool.begin().await.unwrap();
    let booking = BookingRepository::insert(
        &mut tx,
        CreateBookingRow {
            uid: Uuid::new_v4().to_string(),
            event_type_id: Some(et.id.clone()),
            user_id: ORGANIZER_ID.to_string(),
            title: et.title.clone(),
            description: None,
            location: None,
            start_time: start,
            end_time: start + Duration::minutes(et.length_minutes),
            custom_inputs_json: "[]".to_string(),
        },
    )
    .await
    .unwrap();
    AttendeeRepository::insert(
        &mut tx,
        booking.id,
        &CreateAttendee {
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            time_zone: "America/Los_Angeles".to_string(),
            phone_number: None,
            sms_reminder_consent: false,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    (booking.id, booking.uid)
}

/// Accepted booking for the default organizer with one attendee (Sam, no phone).
pub async fn seed_confirmed_booking(pool: &SqlitePool, minutes_until_start: i64) -> Seeded {
    let et = seed_event_type(pool, "intro", 0, true).await;
    let (booking_id, uid) = insert_pending_booking(pool, &et, minutes_until_start).await;
    assert!(BookingRepository::mark_accepted(pool, booking_id).await.unwrap());
    Seeded {
        booking_id,
        uid,
        user_id: ORGANIZER_ID.to_string(),
        event_type_id: et.id,
    }
}

/// Pending priced booking with an unpaid payment row for `intent`.
pub async fn seed_paid_pending_booking(pool: &SqlitePool, intent: &str) -> i64 {
    let et = seed_event_type(pool, &format!("paid-{}", intent), 5000, false).await;
    let (booking_id, _) = insert_pending_booking(pool, &et, 2 * 24 * 60).await;
    let mut conn = pool.acquire().await.unwrap();
    PaymentRepository::insert(
        &mut conn,
        CreatePayment {
            external_id: intent.to_string(),
            booking_id,
            amount: et.price,
            currency: et.currency.clone(),
        },
    )
    .await
    .unwrap();
    booking_id
}

pub async fn event_for(pool: &SqlitePool, booking_id: i64) -> CalendarEvent {
    let booking = BookingRepository::find_by_id(pool, booking_id)
        .await
        .unwrap()
        .unwrap();
    let organizer = UserRepository::find_by_id(pool, &booking.user_id)
        .await
        .unwrap()
        .unwrap();
    CalendarEvent::from_booking(&booking, &organizer)
}

pub async fn add_attendee(
    pool: &SqlitePool,
    booking_id: i64,
    email: &str,
    phone: Option<&str>,
    consent: bool,
) {
    let mut conn = pool.acquire().await.unwrap();
    AttendeeRepository::insert(
        &mut conn,
        booking_id,
        &CreateAttendee {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            time_zone: "Europe/Berlin".to_string(),
            phone_number: phone.map(str::to_string),
            sms_reminder_consent: consent,
        },
    )
    .await
    .unwrap();
}

pub async fn add_reference(pool: &SqlitePool, booking_id: i64, integration_type: &str, url: &str) {
    sqlx::query(
        r#"
        INSERT INTO booking_references (id, booking_id, integration_type, meeting_url)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(booking_id)
    .bind(integration_type)
    .bind(url)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn add_credential(pool: &SqlitePool, user_id: &str, integration_type: &str, key_json: &str) {
    sqlx::query(
        "INSERT INTO credentials (id, user_id, integration_type, key_json) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(integration_type)
    .bind(key_json)
    .execute(pool)
    .await
    .unwrap();
}

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
pub struct RecordingEmail {
    failing: Vec<String>,
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmail {
    pub fn failing_for(emails: &[&str]) -> Self {
        Self {
            failing: emails.iter().map(|e| e.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Addresses of successful sends, in send order.
    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to_email.clone())
            .collect()
    }
}

#[async_trait]
impl EmailGateway for RecordingEmail {
    async fn send_email(&self, message: &EmailMessage) -> AppResult<()> {
        if self.failing.contains(&message.to_email) {
            return Err(AppError::Integration(format!("mailbox {} unavailable", message.to_email)));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<SmsMessage>>,
}

impl RecordingSms {
    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to_phone.clone())
            .collect()
    }
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send_sms(&self, message: &SmsMessage) -> AppResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticDirectory {
    phones: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            phones: entries
                .iter()
                .map(|(email, phone)| (email.to_string(), phone.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PhoneDirectory for StaticDirectory {
    async fn find_opted_in_phone(&self, email: &str) -> AppResult<Option<String>> {
        Ok(self.phones.get(email).cloned())
    }
}

pub struct FakeIntegration {
    integration_type: String,
    fail: bool,
    calls: Mutex<usize>,
}

impl FakeIntegration {
    pub fn succeeding(integration_type: &str) -> Self {
        Self {
            integration_type: integration_type.to_string(),
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(integration_type: &str) -> Self {
        Self {
            fail: true,
            ..Self::succeeding(integration_type)
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CalendarIntegration for FakeIntegration {
    fn integration_type(&self) -> &str {
        &self.integration_type
    }

    async fn create_event(&self, event: &CalendarEvent) -> AppResult<CreatedEvent> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(AppError::Integration(format!(
                "{} is down",
                self.integration_type
            )));
        }
        Ok(CreatedEvent {
            external_uid: Some(event.uid.clone()),
            meeting_id: Some(format!("m-{}", event.booking_id)),
            meeting_url: Some(format!("https://meet.example.com/{}", self.integration_type)),
            meeting_password: None,
        })
    }
}

pub struct StaticIntegrations {
    integrations: Vec<Arc<FakeIntegration>>,
}

impl StaticIntegrations {
    pub fn new(integrations: Vec<Arc<FakeIntegration>>) -> Self {
        Self { integrations }
    }
}

#[async_trait]
impl IntegrationProvider for StaticIntegrations {
    async fn integrations_for(&self, _user_id: &str) -> AppResult<Vec<Arc<dyn CalendarIntegration>>> {
        Ok(self
            .integrations
            .iter()
            .map(|i| i.clone() as Arc<dyn CalendarIntegration>)
            .collect())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired services over an in-memory database and recording fakes.
pub struct Harness {
    pub pool: SqlitePool,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentConfirmationHandler>,
    pub notifications: Arc<NotificationService>,
    pub email: Arc<RecordingEmail>,
    pub sms: Arc<RecordingSms>,
    pub integration: Arc<FakeIntegration>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(
            RecordingEmail::default(),
            FakeIntegration::succeeding("daily_video"),
        )
        .await
    }

    pub async fn with_failing_integration() -> Self {
        Self::build(RecordingEmail::default(), FakeIntegration::failing("daily_video")).await
    }

    pub async fn with_email_failing_for(emails: &[&str]) -> Self {
        Self::build(
            RecordingEmail::failing_for(emails),
            FakeIntegration::succeeding("daily_video"),
        )
        .await
    }

    async fn build(email: RecordingEmail, integration: FakeIntegration) -> Self {
        let pool = memory_pool().await;
        let email = Arc::new(email);
        let sms = Arc::new(RecordingSms::default());
        let integration = Arc::new(integration);

        let notifications = Arc::new(NotificationService::new(
            pool.clone(),
            email.clone(),
            sms.clone(),
            Arc::new(StaticDirectory::default()),
        ));
        let dispatcher = Arc::new(CalendarEventDispatcher::new(
            pool.clone(),
            Arc::new(StaticIntegrations::new(vec![integration.clone()])),
        ));
        let bookings = Arc::new(BookingService::new(
            pool.clone(),
            TieBreak::FirstSeen,
            dispatcher,
            notifications.clone(),
        ));
        let payments = Arc::new(PaymentConfirmationHandler::new(pool.clone(), bookings.clone()));

        Self {
            pool,
            bookings,
            payments,
            notifications,
            email,
            sms,
            integration,
        }
    }

    pub fn scheduler(&self, lead_times_minutes: Vec<i64>) -> ReminderScheduler {
        ReminderScheduler::new(self.pool.clone(), lead_times_minutes, self.notifications.clone())
    }

    /// Application state over this harness, for driving the HTTP routes.
    pub fn state(&self, config: Config) -> Arc<AppState> {
        let reminders = Arc::new(self.scheduler(config.reminders.lead_times_minutes.clone()));
        Arc::new(AppState {
            db: self.pool.clone(),
            config,
            bookings: self.bookings.clone(),
            payments: self.payments.clone(),
            reminders,
        })
    }
}
