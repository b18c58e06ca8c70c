use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

/// Append-only store of provisioned meetings. Rows are never updated.
pub struct BookingReferenceRepository;

impl BookingReferenceRepository {
    /// Insert a reference. Returns `None` when a reference for the same
    /// (booking, integration type) already exists, leaving the existing row intact.
    pub async fn create(
        pool: &SqlitePool,
        reference: CreateBookingReference,
    ) -> AppResult<Option<BookingReference>> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, BookingReference>(
            r#"
            INSERT INTO booking_references (
                id, booking_id, integration_type, external_uid,
                meeting_id, meeting_url, meeting_password, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (booking_id, integration_type) DO NOTHING
            RETURNING
                id, booking_id, integration_type, external_uid,
                meeting_id, meeting_url, meeting_password, created_at
            "#,
        )
        .bind(id)
        .bind(reference.booking_id)
        .bind(reference.integration_type)
        .bind(reference.external_uid)
        .bind(reference.meeting_id)
        .bind(reference.meeting_url)
        .bind(reference.meeting_password)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_booking_id(
        pool: &SqlitePool,
        booking_id: i64,
    ) -> AppResult<Vec<BookingReference>> {
        sqlx::query_as::<_, BookingReference>(
            r#"
            SELECT
                id, booking_id, integration_type, external_uid,
                meeting_id, meeting_url, meeting_password, created_at
            FROM booking_references
            WHERE booking_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_booking_ids(
        pool: &SqlitePool,
        booking_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<BookingReference>>> {
        let mut out: HashMap<i64, Vec<BookingReference>> = HashMap::new();
        if booking_ids.is_empty() {
            return Ok(out);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                id, booking_id, integration_type, external_uid,
                meeting_id, meeting_url, meeting_password, created_at
            FROM booking_references
            WHERE booking_id IN ("#,
        );
        let mut separated = qb.separated(", ");
        for id in booking_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY created_at ASC");

        let rows = qb
            .build_query_as::<BookingReference>()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        for row in rows {
            out.entry(row.booking_id).or_default().push(row);
        }
        Ok(out)
    }
}
