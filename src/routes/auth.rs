use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::AppState;

const API_KEY_QUERY_PARAM: &str = "apiKey";

/// Extractor guarding operator endpoints (reminder trigger, remediation).
///
/// The key is read from the `Authorization` header (raw or `Bearer <key>`)
/// or from the `apiKey` query parameter. With no key configured every request
/// is refused.
pub struct OperatorKey;

fn presented_key(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let header = header.trim();
        let key = if header.len() > 7 && header[..7].eq_ignore_ascii_case("bearer ") {
            header[7..].trim()
        } else {
            header
        };
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    parts.uri.query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == API_KEY_QUERY_PARAM)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OperatorKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.reminders.api_key.as_deref() else {
            tracing::warn!("CRON_API_KEY is not set; refusing operator request");
            return Err(AppError::Unauthorized);
        };

        match presented_key(parts) {
            Some(key) if key == expected => Ok(OperatorKey),
            Some(_) => {
                tracing::debug!("Operator key mismatch");
                Err(AppError::Unauthorized)
            }
            None => {
                tracing::debug!("Missing operator key");
                Err(AppError::Unauthorized)
            }
        }
    }
}
