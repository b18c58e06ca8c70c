use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Log Repository
// ============================================================================

pub struct NotificationLogRepository;

impl NotificationLogRepository {
    pub async fn create(
        pool: &SqlitePool,
        log: CreateNotificationLog,
    ) -> AppResult<NotificationLog> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_history (
                id, booking_id, notification_kind, channel,
                recipient, subject, status, error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, booking_id, notification_kind, channel,
                recipient, subject, status, error_message, created_at
            "#,
        )
        .bind(id)
        .bind(log.booking_id)
        .bind(log.notification_kind)
        .bind(log.channel)
        .bind(log.recipient)
        .bind(log.subject)
        .bind(log.status)
        .bind(log.error_message)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Send history for a booking, oldest first.
    pub async fn find_by_booking_id(
        pool: &SqlitePool,
        booking_id: i64,
    ) -> AppResult<Vec<NotificationLog>> {
        sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT
                id, booking_id, notification_kind, channel,
                recipient, subject, status, error_message, created_at
            FROM notification_history
            WHERE booking_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
