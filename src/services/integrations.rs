//! Calendar/video providers behind one capability interface.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::config::VideoConfig;
use crate::db::{Credential, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::event::CalendarEvent;

pub const DAILY_VIDEO: &str = "daily_video";

/// What a provider returns for a successfully created event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedEvent {
    pub external_uid: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_password: Option<String>,
}

#[async_trait]
pub trait CalendarIntegration: Send + Sync + 'static {
    /// Stable type tag stored on the resulting booking reference.
    fn integration_type(&self) -> &str;

    async fn create_event(&self, event: &CalendarEvent) -> AppResult<CreatedEvent>;
}

/// Source of the integrations configured for an organizer.
#[async_trait]
pub trait IntegrationProvider: Send + Sync + 'static {
    async fn integrations_for(&self, user_id: &str) -> AppResult<Vec<Arc<dyn CalendarIntegration>>>;
}

// ============================================================================
// Daily video rooms
// ============================================================================

#[derive(Debug, Deserialize)]
struct DailyRoom {
    id: String,
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DailyMeetingToken {
    token: String,
}

pub struct DailyVideoIntegration {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DailyVideoIntegration {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Daily API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Integration(format!(
                "Daily API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Integration(format!("Failed to parse Daily response: {}", e)))
    }
}

#[async_trait]
impl CalendarIntegration for DailyVideoIntegration {
    fn integration_type(&self) -> &str {
        DAILY_VIDEO
    }

    async fn create_event(&self, event: &CalendarEvent) -> AppResult<CreatedEvent> {
        // Rooms open a little early and expire an hour after the booking ends.
        let nbf = (event.start_time - Duration::minutes(15)).and_utc().timestamp();
        let exp = (event.end_time + Duration::hours(1)).and_utc().timestamp();

        let room: DailyRoom = self
            .post(
                "/rooms",
                json!({
                    "privacy": "private",
                    "properties": {
                        "nbf": nbf,
                        "exp": exp,
                        "enable_prejoin_ui": true,
                        "enable_chat": true,
                    }
                }),
            )
            .await?;

        let token: DailyMeetingToken = self
            .post("/meeting-tokens", participant_token_request(&room.name, exp))
            .await?;

        Ok(CreatedEvent {
            external_uid: Some(room.name),
            meeting_id: Some(room.id),
            meeting_url: Some(room.url),
            meeting_password: Some(token.token),
        })
    }
}

/// Token body for joining a private room. The token travels in booking
/// notifications, so it never carries owner rights.
fn participant_token_request(room_name: &str, exp: i64) -> serde_json::Value {
    json!({
        "properties": {
            "room_name": room_name,
            "exp": exp,
            "is_owner": false,
        }
    })
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct DailyCredentialKey {
    api_key: Option<String>,
}

/// Builds an organizer's integrations from their stored credentials.
pub struct IntegrationRegistry {
    pool: SqlitePool,
    client: reqwest::Client,
    video: VideoConfig,
}

impl IntegrationRegistry {
    pub fn new(pool: SqlitePool, client: reqwest::Client, video: VideoConfig) -> Self {
        Self { pool, client, video }
    }

    fn build(&self, credential: &Credential) -> Option<Arc<dyn CalendarIntegration>> {
        match credential.integration_type.as_str() {
            DAILY_VIDEO => {
                let key: DailyCredentialKey =
                    serde_json::from_str(&credential.key_json).unwrap_or_default();
                let api_key = key.api_key.or_else(|| self.video.daily_api_key.clone());
                match api_key {
                    Some(api_key) => Some(Arc::new(DailyVideoIntegration::new(
                        self.client.clone(),
                        self.video.daily_api_url.clone(),
                        api_key,
                    ))),
                    None => {
                        tracing::warn!(
                            "Skipping daily_video credential {}: no API key configured",
                            credential.id
                        );
                        None
                    }
                }
            }
            other => {
                tracing::warn!(
                    "Skipping credential {} with unsupported integration type {}",
                    credential.id,
                    other
                );
                None
            }
        }
    }
}

#[async_trait]
impl IntegrationProvider for IntegrationRegistry {
    async fn integrations_for(&self, user_id: &str) -> AppResult<Vec<Arc<dyn CalendarIntegration>>> {
        let credentials = UserRepository::find_credentials(&self.pool, user_id).await?;
        Ok(credentials.iter().filter_map(|c| self.build(c)).collect())
    }
}
