use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    /// Payment processor's intent id. Unique; the webhook idempotency anchor.
    pub external_id: String,
    pub booking_id: i64,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub success: bool,
    pub refunded: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub external_id: String,
    pub booking_id: i64,
    pub amount: i64,
    pub currency: String,
}

/// Result of the atomic payment confirmation write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub booking_id: i64,
    /// True only for the single writer that moved the booking to confirmed.
    pub booking_confirmed: bool,
}
