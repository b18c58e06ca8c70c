use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{Booking, BookingRepository, BookingStatus};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::routes::auth::OperatorKey;
use crate::services::bookings::{CreateBooking, TransitionOutcome};
use crate::services::dispatcher::DispatchSummary;
use crate::services::notifications::NotificationResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_booking))
        .route("/resend-reminder", post(resend_reminder))
        .route("/:id/confirm", post(confirm_booking))
        .route("/:id/cancel", post(cancel_booking))
        .route("/:id/dispatch", post(dispatch_booking))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirmed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub booking_id: i64,
    pub outcome: TransitionOutcome,
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct ResendReminderRequest {
    #[serde(default)]
    pub uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResendReminderResponse {
    pub message: String,
    pub responses: Vec<NotificationResult>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_booking(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
    Json(body): Json<CreateBooking>,
) -> AppResult<(StatusCode, Json<Booking>)> {
    let booking = state.bookings.create(body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
    Path(id): Path<i64>,
    Json(body): Json<ConfirmRequest>,
) -> AppResult<Json<TransitionResponse>> {
    let outcome = if body.confirmed {
        state.bookings.confirm(id).await?
    } else {
        state.bookings.reject(id, body.reason.as_deref()).await?
    };
    transition_response(&state, id, outcome).await
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
    Path(id): Path<i64>,
) -> AppResult<Json<TransitionResponse>> {
    let outcome = state.bookings.cancel(id).await?;
    transition_response(&state, id, outcome).await
}

async fn dispatch_booking(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
    Path(id): Path<i64>,
) -> AppResult<Json<DispatchSummary>> {
    let summary = state.bookings.redispatch(id).await?;
    tracing::info!(
        "Operator dispatch for booking_id={}: created={} skipped={} failed={}",
        id,
        summary.created.len(),
        summary.skipped.len(),
        summary.failures.len()
    );
    Ok(Json(summary))
}

async fn resend_reminder(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
    Json(body): Json<ResendReminderRequest>,
) -> AppResult<Json<ResendReminderResponse>> {
    let uid = body
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("uid is required".to_string()))?;

    let responses = state.bookings.resend_reminder(uid).await?;
    Ok(Json(ResendReminderResponse {
        message: i18n::t("reminders.resent"),
        responses,
    }))
}

async fn transition_response(
    state: &AppState,
    id: i64,
    outcome: TransitionOutcome,
) -> AppResult<Json<TransitionResponse>> {
    let booking = BookingRepository::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {}", id)))?;
    Ok(Json(TransitionResponse {
        booking_id: id,
        outcome,
        status: booking.status,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use serde_json::{json, Value};

    use crate::config::Config;
    use crate::routes;
    use crate::test_support::{self, Harness};

    fn config() -> Config {
        let mut config = Config::default();
        config.reminders.api_key = Some("op-key".to_string());
        config
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::AUTHORIZATION, "Bearer op-key")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn booking_body(event_type_id: &str) -> Value {
        let start = chrono::Utc::now() + chrono::Duration::days(3);
        let end = start + chrono::Duration::minutes(30);
        json!({
            "eventTypeId": event_type_id,
            "startTime": start,
            "endTime": end,
            "attendees": [
                { "name": "Sam", "email": "sam@example.com", "timeZone": "America/Los_Angeles" }
            ]
        })
    }

    #[tokio::test]
    async fn create_requires_operator_key() {
        let h = Harness::new().await;
        let et = test_support::seed_event_type(&h.pool, "free", 0, false).await;
        let app = routes::test_app(h.state(config()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/bookings")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(booking_body(&et.id).to_string()))
            .unwrap();
        let (status, _) = routes::send(app, request).await;
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_then_reject_then_confirm() {
        let h = Harness::new().await;
        let et = test_support::seed_event_type(&h.pool, "manual", 0, true).await;
        let state = h.state(config());

        let (status, body) =
            routes::send(routes::test_app(state.clone()), post("/api/bookings", booking_body(&et.id)))
                .await;
        assert_eq!(status, http::StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = routes::send(
            routes::test_app(state.clone()),
            post(
                &format!("/api/bookings/{}/confirm", id),
                json!({ "confirmed": false, "reason": "Out of office" }),
            ),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["outcome"], "applied");
        assert_eq!(body["status"], "rejected");

        let (status, body) = routes::send(
            routes::test_app(state),
            post(&format!("/api/bookings/{}/confirm", id), json!({ "confirmed": true })),
        )
        .await;
        assert_eq!(status, http::StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn dispatch_skips_existing_reference() {
        let h = Harness::new().await;
        let et = test_support::seed_event_type(&h.pool, "free", 0, false).await;
        let booking = h
            .bookings
            .create(serde_json::from_value(booking_body(&et.id)).unwrap())
            .await
            .unwrap();

        let (status, body) = routes::send(
            routes::test_app(h.state(config())),
            post(&format!("/api/bookings/{}/dispatch", booking.id), json!({})),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["skipped"], json!(["daily_video"]));
        assert_eq!(h.integration.calls(), 1);
    }

    #[tokio::test]
    async fn resend_reminder_validates_uid() {
        let h = Harness::new().await;
        let seeded = test_support::seed_confirmed_booking(&h.pool, 600).await;
        let state = h.state(config());

        let (status, _) = routes::send(
            routes::test_app(state.clone()),
            post("/api/bookings/resend-reminder", json!({})),
        )
        .await;
        assert_eq!(status, http::StatusCode::BAD_REQUEST);

        let (status, _) = routes::send(
            routes::test_app(state.clone()),
            post("/api/bookings/resend-reminder", json!({ "uid": "unknown" })),
        )
        .await;
        assert_eq!(status, http::StatusCode::NOT_FOUND);

        let (status, body) = routes::send(
            routes::test_app(state),
            post("/api/bookings/resend-reminder", json!({ "uid": seeded.uid })),
        )
        .await;
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["responses"].as_array().unwrap().len(), 2);
    }
}
