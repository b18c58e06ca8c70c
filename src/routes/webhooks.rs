use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::i18n;
use crate::services::payments::{
    verify_signature, PaymentWebhookEvent, WebhookOutcome, SIGNATURE_HEADER,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/payments", post(handle_payment_webhook))
}

async fn handle_payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let secret = state
        .config
        .payments
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Config("PAYMENT_WEBHOOK_SECRET is not set".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::SignatureInvalid(format!("Missing {} header", SIGNATURE_HEADER)))?;

    verify_signature(
        secret,
        signature,
        &body,
        chrono::Utc::now().timestamp(),
        state.config.payments.webhook_tolerance_seconds,
    )?;

    let event: PaymentWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;

    tracing::info!(
        "Received payment webhook: id={}, type={}",
        event.id,
        event.event_type
    );

    match state.payments.handle(&event).await {
        Ok(WebhookOutcome::Confirmed { booking_id, .. }) => Ok((
            StatusCode::OK,
            Json(json!({
                "received": true,
                "bookingId": booking_id,
                "message": i18n::t("webhook.payment_confirmed"),
            })),
        )),
        Ok(WebhookOutcome::AlreadyProcessed { booking_id }) => Ok((
            StatusCode::OK,
            Json(json!({
                "received": true,
                "bookingId": booking_id,
                "message": i18n::t("webhook.already_processed"),
            })),
        )),
        // Acknowledge so the sender does not retry.
        Err(e) if e.is_benign() => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "received": true, "message": e.to_string() })),
        )),
        Err(e) => Err(e),
    }
}
