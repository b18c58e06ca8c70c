use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::SqlitePool;

use crate::db::PaymentRepository;
use crate::error::{AppError, AppResult};
use crate::services::bookings::{BookingService, ConfirmationEffects};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

const EVENT_PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Webhook event types this service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentIntentSucceeded,
}

impl WebhookEventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_PAYMENT_INTENT_SUCCEEDED => Some(WebhookEventKind::PaymentIntentSucceeded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookData {
    pub object: PaymentWebhookObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookObject {
    /// Payment intent id.
    pub id: String,
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// This delivery confirmed the booking and ran dispatch + notification.
    Confirmed {
        booking_id: i64,
        effects: ConfirmationEffects,
    },
    /// The booking was already confirmed; payment success recorded, nothing else done.
    AlreadyProcessed { booking_id: i64 },
}

/// Parse `t=<unix>,v1=<hex>[,v1=<hex>...]`.
fn parse_signature_header(header: &str) -> AppResult<(i64, Vec<Vec<u8>>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    AppError::SignatureInvalid("Invalid signature timestamp".to_string())
                })?)
            }
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::SignatureInvalid("Missing signature timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::SignatureInvalid("Missing v1 signature".to_string()));
    }
    Ok((timestamp, signatures))
}

/// Verify a signed webhook body against `secret`.
///
/// The signed payload is `"{t}.{body}"`; deliveries older (or newer) than
/// `tolerance_seconds` relative to `now` are refused.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
    tolerance_seconds: i64,
) -> AppResult<()> {
    let (timestamp, signatures) = parse_signature_header(header)?;

    if (now - timestamp).abs() > tolerance_seconds {
        return Err(AppError::SignatureInvalid(
            "Timestamp outside the tolerance zone".to_string(),
        ));
    }

    let matched = signatures.iter().any(|sig| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(sig).is_ok()
    });

    if !matched {
        return Err(AppError::SignatureInvalid(
            "No signature matches the payload".to_string(),
        ));
    }
    Ok(())
}

/// Build a signature header value for `body`, as the payment processor does.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to create HMAC")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Consumes verified payment webhook events.
///
/// The payment's unique external id plus the `confirmed = 0` precondition make
/// repeated delivery a no-op: only the first delivery dispatches and notifies.
pub struct PaymentConfirmationHandler {
    pool: SqlitePool,
    bookings: Arc<BookingService>,
}

impl PaymentConfirmationHandler {
    pub fn new(pool: SqlitePool, bookings: Arc<BookingService>) -> Self {
        Self { pool, bookings }
    }

    pub async fn handle(&self, event: &PaymentWebhookEvent) -> AppResult<WebhookOutcome> {
        let kind = WebhookEventKind::from_type(&event.event_type).ok_or_else(|| {
            tracing::info!(
                "Ignoring webhook event id={} of unhandled type {}",
                event.id,
                event.event_type
            );
            AppError::UnknownEventType(event.event_type.clone())
        })?;

        match kind {
            WebhookEventKind::PaymentIntentSucceeded => {
                self.payment_succeeded(&event.id, &event.data.object.id).await
            }
        }
    }

    async fn payment_succeeded(&self, event_id: &str, intent_id: &str) -> AppResult<WebhookOutcome> {
        let confirmation = PaymentRepository::confirm_by_external_id(&self.pool, intent_id)
            .await?
            .ok_or_else(|| {
                tracing::info!(
                    "Webhook event id={}: no payment for intent {}, ignoring",
                    event_id,
                    intent_id
                );
                AppError::PaymentNotFound(intent_id.to_string())
            })?;

        if !confirmation.booking_confirmed {
            tracing::info!(
                "Webhook event id={}: booking_id={} already confirmed, skipping dispatch",
                event_id,
                confirmation.booking_id
            );
            return Ok(WebhookOutcome::AlreadyProcessed {
                booking_id: confirmation.booking_id,
            });
        }

        tracing::info!(
            "Webhook event id={}: payment {} confirmed booking_id={}",
            event_id,
            intent_id,
            confirmation.booking_id
        );

        let effects = self
            .bookings
            .run_confirmation_effects(confirmation.booking_id)
            .await;

        Ok(WebhookOutcome::Confirmed {
            booking_id: confirmation.booking_id,
            effects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        BookingReferenceRepository, BookingRepository, BookingStatus, NotificationLogRepository,
    };
    use crate::test_support::{self, Harness};

    fn succeeded(intent: &str) -> PaymentWebhookEvent {
        PaymentWebhookEvent {
            id: "evt_1".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            data: PaymentWebhookData {
                object: PaymentWebhookObject {
                    id: intent.to_string(),
                },
            },
        }
    }

    #[test]
    fn signature_round_trip_and_tampering() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_payload("whsec", 1_700_000_000, body).unwrap();

        assert!(verify_signature("whsec", &header, body, 1_700_000_010, 300).is_ok());
        assert!(matches!(
            verify_signature("other", &header, body, 1_700_000_010, 300),
            Err(AppError::SignatureInvalid(_))
        ));
        assert!(verify_signature("whsec", &header, br#"{"id":"evt_2"}"#, 1_700_000_010, 300).is_err());
        // Replayed long after signing.
        assert!(verify_signature("whsec", &header, body, 1_700_001_000, 300).is_err());
    }

    #[test]
    fn malformed_signature_headers() {
        assert!(verify_signature("s", "", b"{}", 0, 300).is_err());
        assert!(verify_signature("s", "t=abc,v1=00", b"{}", 0, 300).is_err());
        assert!(verify_signature("s", "t=0", b"{}", 0, 300).is_err());
    }

    #[test]
    fn event_kind_dispatch() {
        assert_eq!(
            WebhookEventKind::from_type("payment_intent.succeeded"),
            Some(WebhookEventKind::PaymentIntentSucceeded)
        );
        assert_eq!(WebhookEventKind::from_type("charge.refunded"), None);
    }

    #[tokio::test]
    async fn duplicate_delivery_confirms_once() {
        let h = Harness::new().await;
        let booking_id = test_support::seed_paid_pending_booking(&h.pool, "pi_1").await;

        let first = h.payments.handle(&succeeded("pi_1")).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Confirmed { booking_id: id, .. } if id == booking_id));

        let second = h.payments.handle(&succeeded("pi_1")).await.unwrap();
        assert!(matches!(second, WebhookOutcome::AlreadyProcessed { .. }));

        let booking = BookingRepository::find_by_id(&h.pool, booking_id)
            .await
            .unwrap()
            .unwrap();
        assert!(booking.paid);
        assert!(booking.confirmed);
        assert_eq!(booking.status, BookingStatus::Accepted);

        let payment = PaymentRepository::find_by_external_id(&h.pool, "pi_1")
            .await
            .unwrap()
            .unwrap();
        assert!(payment.success);

        assert_eq!(h.integration.calls(), 1);
        let refs = BookingReferenceRepository::find_by_booking_id(&h.pool, booking_id)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);

        // One scheduled email per participant, sent only by the first delivery.
        let history = NotificationLogRepository::find_by_booking_id(&h.pool, booking_id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(h.email.sent_to().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_deliveries_confirm_once() {
        let h = Harness::new().await;
        let booking_id = test_support::seed_paid_pending_booking(&h.pool, "pi_2").await;

        let event = succeeded("pi_2");
        let (a, b) = tokio::join!(h.payments.handle(&event), h.payments.handle(&event));
        let confirmed = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Confirmed { .. }))
            .count();
        assert_eq!(confirmed, 1);
        assert_eq!(h.integration.calls(), 1);

        let refs = BookingReferenceRepository::find_by_booking_id(&h.pool, booking_id)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[tokio::test]
    async fn payment_after_organizer_confirmation_records_money_only() {
        let h = Harness::new().await;
        let booking_id = test_support::seed_paid_pending_booking(&h.pool, "pi_3").await;

        h.bookings.confirm(booking_id).await.unwrap();
        assert_eq!(h.integration.calls(), 1);

        let outcome = h.payments.handle(&succeeded("pi_3")).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::AlreadyProcessed { .. }));
        assert_eq!(h.integration.calls(), 1);

        let booking = BookingRepository::find_by_id(&h.pool, booking_id)
            .await
            .unwrap()
            .unwrap();
        assert!(booking.paid);
        let payment = PaymentRepository::find_by_external_id(&h.pool, "pi_3")
            .await
            .unwrap()
            .unwrap();
        assert!(payment.success);
    }

    #[tokio::test]
    async fn unknown_payment_and_event_type_are_benign() {
        let h = Harness::new().await;

        let err = h.payments.handle(&succeeded("pi_foreign")).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotFound(_)));
        assert!(err.is_benign());

        let mut event = succeeded("pi_foreign");
        event.event_type = "charge.refunded".to_string();
        let err = h.payments.handle(&event).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownEventType(_)));
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_payment_state() {
        let h = Harness::with_failing_integration().await;
        let booking_id = test_support::seed_paid_pending_booking(&h.pool, "pi_4").await;

        let outcome = h.payments.handle(&succeeded("pi_4")).await.unwrap();
        match outcome {
            WebhookOutcome::Confirmed { effects, .. } => {
                let dispatch = effects.dispatch.unwrap();
                assert!(dispatch.created.is_empty());
                assert_eq!(dispatch.failures.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let booking = BookingRepository::find_by_id(&h.pool, booking_id)
            .await
            .unwrap()
            .unwrap();
        assert!(booking.confirmed && booking.paid);
        assert!(booking.references.is_empty());
    }
}
