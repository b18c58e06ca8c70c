use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Payment Repository
// ============================================================================

const PAYMENT_COLUMNS: &str = r#"
    id, external_id, booking_id, amount, currency, success, refunded, created_at, updated_at
"#;

pub struct PaymentRepository;

impl PaymentRepository {
    /// Record a pending payment for a priced booking. Runs inside the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, payment: CreatePayment) -> AppResult<Payment> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let sql = format!(
            r#"
            INSERT INTO payments (
                id, external_id, booking_id, amount, currency, success, refunded, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .bind(payment.external_id)
            .bind(payment.booking_id)
            .bind(payment.amount)
            .bind(payment.currency)
            .bind(now)
            .bind(now)
            .fetch_one(conn)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::Conflict("Payment intent already linked to a booking".to_string())
                }
                other => AppError::Database(other),
            })
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> AppResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_id = ?");
        sqlx::query_as::<_, Payment>(&sql)
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Mark the payment successful and cascade `paid`/`confirmed` onto its booking,
    /// in one transaction.
    ///
    /// The booking update is conditioned on `confirmed = 0`, so across any number
    /// of concurrent or repeated deliveries exactly one call reports
    /// `booking_confirmed = true`. The write statement runs first so the
    /// transaction holds the write lock before it reads anything.
    ///
    /// Returns `None` when no payment carries `external_id`.
    pub async fn confirm_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> AppResult<Option<PaymentConfirmation>> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let confirmed = sqlx::query(
            r#"
            UPDATE bookings
            SET paid = 1, confirmed = 1, status = 'accepted', updated_at = ?
            WHERE id = (SELECT booking_id FROM payments WHERE external_id = ?)
              AND confirmed = 0
              AND rejected = 0
              AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(external_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .rows_affected()
            == 1;

        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_id = ?");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(external_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let Some(payment) = payment else {
            tx.rollback().await.map_err(AppError::Database)?;
            return Ok(None);
        };

        if !confirmed {
            // Someone else confirmed (or the booking left `pending`); the money
            // still arrived, so record it without touching the status.
            sqlx::query("UPDATE bookings SET paid = 1, updated_at = ? WHERE id = ? AND paid = 0")
                .bind(now)
                .bind(payment.booking_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
        }

        sqlx::query("UPDATE payments SET success = 1, updated_at = ? WHERE id = ? AND success = 0")
            .bind(now)
            .bind(&payment.id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(Some(PaymentConfirmation {
            booking_id: payment.booking_id,
            booking_confirmed: confirmed,
        }))
    }
}
