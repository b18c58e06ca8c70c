use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::db::models::*;
use crate::error::{AppError, AppResult};

pub struct AttendeeRepository;

impl AttendeeRepository {
    /// Insert an attendee for a booking; the email is normalized here so no
    /// caller can store a mixed-case address.
    pub async fn insert(
        conn: &mut SqliteConnection,
        booking_id: i64,
        attendee: &CreateAttendee,
    ) -> AppResult<Attendee> {
        sqlx::query_as::<_, Attendee>(
            r#"
            INSERT INTO attendees (
                booking_id, name, email, time_zone, phone_number, sms_reminder_consent
            )
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, booking_id, name, email, time_zone, phone_number, sms_reminder_consent
            "#,
        )
        .bind(booking_id)
        .bind(attendee.name.trim())
        .bind(normalize_email(&attendee.email))
        .bind(&attendee.time_zone)
        .bind(attendee.phone_number.as_deref())
        .bind(attendee.sms_reminder_consent)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_booking_ids(
        pool: &SqlitePool,
        booking_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<Attendee>>> {
        let mut out: HashMap<i64, Vec<Attendee>> = HashMap::new();
        if booking_ids.is_empty() {
            return Ok(out);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, booking_id, name, email, time_zone, phone_number, sms_reminder_consent
            FROM attendees
            WHERE booking_id IN ("#,
        );
        let mut separated = qb.separated(", ");
        for id in booking_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = qb
            .build_query_as::<Attendee>()
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        for row in rows {
            out.entry(row.booking_id).or_default().push(row);
        }
        Ok(out)
    }
}
