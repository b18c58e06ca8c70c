use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

pub struct EventTypeRepository;

impl EventTypeRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<EventType>> {
        sqlx::query_as::<_, EventType>(
            r#"
            SELECT
                id, owner_user_id, slug, title, length_minutes, price, currency,
                locations_json, custom_inputs_json, disable_guests,
                requires_confirmation, scheduling_type
            FROM event_types
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Users eligible to host the event type, in declared order.
    pub async fn find_hosts(pool: &SqlitePool, event_type_id: &str) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.name, u.username, u.time_zone, u.locale, u.created_at
            FROM event_type_hosts h
            JOIN users u ON u.id = h.user_id
            WHERE h.event_type_id = ?
            ORDER BY h.position ASC, u.id ASC
            "#,
        )
        .bind(event_type_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
