use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::db::models::*;
use crate::db::repository::{AttendeeRepository, BookingReferenceRepository};
use crate::error::{AppError, AppResult};

// ============================================================================
// Booking Repository
// ============================================================================

const BOOKING_COLUMNS: &str = r#"
    id, uid, event_type_id, user_id, title, description, location,
    start_time, end_time, custom_inputs_json,
    confirmed, rejected, paid, status, rejection_reason,
    created_at, updated_at
"#;

/// Owns every write to `bookings`.
///
/// State transitions are single conditional `UPDATE` statements whose `WHERE`
/// clause encodes the allowed source states. `rows_affected() == 1` means this
/// caller won the transition; zero means another writer got there first or the
/// transition is not allowed, and nothing was changed.
pub struct BookingRepository;

impl BookingRepository {
    /// Insert a new booking in `pending` state. Runs inside the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, row: CreateBookingRow) -> AppResult<Booking> {
        let now = Utc::now().naive_utc();

        let sql = format!(
            r#"
            INSERT INTO bookings (
                uid, event_type_id, user_id, title, description, location,
                start_time, end_time, custom_inputs_json,
                confirmed, rejected, paid, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 'pending', ?, ?)
            RETURNING {BOOKING_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Booking>(&sql)
            .bind(row.uid)
            .bind(row.event_type_id)
            .bind(row.user_id)
            .bind(row.title)
            .bind(row.description)
            .bind(row.location)
            .bind(row.start_time)
            .bind(row.end_time)
            .bind(row.custom_inputs_json)
            .bind(now)
            .bind(now)
            .fetch_one(conn)
            .await
            .map_err(AppError::Database)
    }

    /// Find a booking with its attendees and references.
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?");
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        match booking {
            Some(mut b) => {
                Self::load_children(pool, std::slice::from_mut(&mut b)).await?;
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_uid(pool: &SqlitePool, uid: &str) -> AppResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE uid = ?");
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(uid)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        match booking {
            Some(mut b) => {
                Self::load_children(pool, std::slice::from_mut(&mut b)).await?;
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    /// Pending -> Accepted. Precondition `confirmed = 0` makes this the single
    /// winner between an organizer confirmation and a payment webhook.
    pub async fn mark_accepted(pool: &SqlitePool, id: i64) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET confirmed = 1, status = 'accepted', updated_at = ?
            WHERE id = ? AND status = 'pending' AND confirmed = 0 AND rejected = 0
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending -> Rejected.
    pub async fn mark_rejected(pool: &SqlitePool, id: i64, reason: Option<&str>) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET rejected = 1, status = 'rejected', rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'pending' AND confirmed = 0
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending|Accepted -> Cancelled.
    pub async fn mark_cancelled(pool: &SqlitePool, id: i64) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'accepted')
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Confirmed, non-rejected, accepted bookings starting within `[from, to]`,
    /// with attendees and references loaded.
    pub async fn find_confirmed_starting_between(
        pool: &SqlitePool,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE confirmed = 1
              AND rejected = 0
              AND status = 'accepted'
              AND start_time >= ?
              AND start_time <= ?
            ORDER BY start_time ASC
            "#
        );

        let mut bookings = sqlx::query_as::<_, Booking>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Self::load_children(pool, &mut bookings).await?;
        Ok(bookings)
    }

    /// Accepted-booking counts per user for one event type. Users without
    /// bookings are absent from the map.
    pub async fn count_accepted_by_user(
        pool: &SqlitePool,
        event_type_id: &str,
        user_ids: &[String],
    ) -> AppResult<HashMap<String, i64>> {
        let mut counts = HashMap::new();
        if user_ids.is_empty() {
            return Ok(counts);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT user_id, COUNT(*) FROM bookings WHERE status = 'accepted' AND event_type_id = ",
        );
        qb.push_bind(event_type_id);
        qb.push(" AND user_id IN (");
        let mut separated = qb.separated(", ");
        for id in user_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") GROUP BY user_id");

        let rows: Vec<(String, i64)> = qb
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        counts.extend(rows);
        Ok(counts)
    }

    async fn load_children(pool: &SqlitePool, bookings: &mut [Booking]) -> AppResult<()> {
        if bookings.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = bookings.iter().map(|b| b.id).collect();

        let mut attendees = AttendeeRepository::find_by_booking_ids(pool, &ids).await?;
        let mut references = BookingReferenceRepository::find_by_booking_ids(pool, &ids).await?;

        for booking in bookings.iter_mut() {
            booking.attendees = attendees.remove(&booking.id).unwrap_or_default();
            booking.references = references.remove(&booking.id).unwrap_or_default();
        }
        Ok(())
    }
}
