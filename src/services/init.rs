//! Initialization helpers for the application:
//! - database connection + migrations
//! - service graph wiring
//! - background worker spawn helpers

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::{
    bookings::BookingService,
    dispatcher::CalendarEventDispatcher,
    gateways,
    integrations::{IntegrationProvider, IntegrationRegistry},
    notifications::NotificationService,
    payments::PaymentConfirmationHandler,
    reminders::ReminderScheduler,
};
use crate::AppState;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Wire the lifecycle services around a pool and a set of integrations.
pub fn build_state(
    pool: SqlitePool,
    config: Config,
    integrations: Arc<dyn IntegrationProvider>,
    gateways: gateways::Gateways,
) -> AppState {
    let notifications = Arc::new(NotificationService::new(
        pool.clone(),
        gateways.email,
        gateways.sms,
        gateways.directory,
    ));
    let dispatcher = Arc::new(CalendarEventDispatcher::new(pool.clone(), integrations));
    let bookings = Arc::new(BookingService::new(
        pool.clone(),
        config.assignment.tie_break,
        dispatcher,
        notifications.clone(),
    ));
    let payments = Arc::new(PaymentConfirmationHandler::new(pool.clone(), bookings.clone()));
    let reminders = Arc::new(ReminderScheduler::new(
        pool.clone(),
        config.reminders.lead_times_minutes.clone(),
        notifications,
    ));

    AppState {
        db: pool,
        config,
        bookings,
        payments,
        reminders,
    }
}

/// Production wiring: HTTP gateways and the credential-backed integration registry.
pub fn build_production_state(pool: SqlitePool, config: Config) -> Result<AppState> {
    let client = gateways::http_client()?;
    let registry = Arc::new(IntegrationRegistry::new(
        pool.clone(),
        client.clone(),
        config.video.clone(),
    ));
    let gateways = gateways::from_config(&config, &client);
    Ok(build_state(pool, config, registry, gateways))
}

/// Spawn background workers:
/// - periodic reminder run (only when `REMINDER_WORKER_ENABLED`)
///
/// Returns the `JoinHandle`s so callers can await shutdown. Each worker listens
/// for a shutdown notification via a `tokio::sync::broadcast::Sender<()>`.
pub fn spawn_background_workers(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.config.reminders.worker_enabled {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let interval = Duration::from_secs(state.config.reminders.poll_interval_seconds.max(1));
        handles.push(tokio::spawn(async move {
            loop {
                tracing::info!("Starting periodic reminder run");

                match state.reminders.run(chrono::Utc::now().naive_utc()).await {
                    Ok(summary) => tracing::info!(
                        "Periodic reminder run sent {} notification(s)",
                        summary.notifications_sent
                    ),
                    Err(e) => tracing::warn!("Periodic reminder run failed: {:?}", e),
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reminder worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    } else {
        tracing::info!("Reminder worker disabled; relying on the cron trigger endpoint");
    }

    handles
}
