use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Reminder Log Repository
// ============================================================================

pub struct ReminderLogRepository;

impl ReminderLogRepository {
    /// Existing log rows for one (type, lead time), restricted to `booking_ids`.
    pub async fn find_for_bookings(
        pool: &SqlitePool,
        reminder_type: ReminderType,
        elapsed_minutes: i64,
        booking_ids: &[i64],
    ) -> AppResult<Vec<ReminderLog>> {
        if booking_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, booking_id, reminder_type, elapsed_minutes, created_at
            FROM reminder_logs
            WHERE reminder_type = "#,
        );
        qb.push_bind(reminder_type.as_str());
        qb.push(" AND elapsed_minutes = ");
        qb.push_bind(elapsed_minutes);
        qb.push(" AND booking_id IN (");
        let mut separated = qb.separated(", ");
        for id in booking_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        qb.build_query_as::<ReminderLog>()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Record that the reminder was attempted. The unique (booking, type, lead time)
    /// key turns a second insert into a no-op; returns `false` in that case.
    pub async fn record_attempt(
        pool: &SqlitePool,
        booking_id: i64,
        reminder_type: ReminderType,
        elapsed_minutes: i64,
    ) -> AppResult<bool> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO reminder_logs (id, booking_id, reminder_type, elapsed_minutes, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (booking_id, reminder_type, elapsed_minutes) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(booking_id)
        .bind(reminder_type.as_str())
        .bind(elapsed_minutes)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_for_booking(pool: &SqlitePool, booking_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reminder_logs WHERE booking_id = ?")
            .bind(booking_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
