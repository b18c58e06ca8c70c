pub mod auth;
pub mod bookings;
pub mod cron;
pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

/// Health check plus the operator API. Webhooks are nested by the caller so
/// the rate limiter can be layered on them alone.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/bookings", bookings::router())
        .nest("/api/cron", cron::router())
}

#[cfg(test)]
pub(crate) fn test_app(state: Arc<AppState>) -> Router {
    api_router()
        .nest("/webhooks", webhooks::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) async fn send(
    app: Router,
    request: http::Request<axum::body::Body>,
) -> (http::StatusCode, serde_json::Value) {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};

    use super::*;
    use crate::config::Config;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn health_reports_database() {
        let h = Harness::new().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(h.state(Config::default())), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
    }
}
