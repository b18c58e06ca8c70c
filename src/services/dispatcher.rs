use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{Booking, BookingReference, BookingReferenceRepository, CreateBookingReference};
use crate::error::AppResult;
use crate::services::event::CalendarEvent;
use crate::services::integrations::{CalendarIntegration, IntegrationProvider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFailure {
    pub integration_type: String,
    pub error: String,
}

/// Outcome of one dispatch run. Never an error: failures are listed, not raised.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub booking_id: i64,
    pub created: Vec<BookingReference>,
    /// Integration types that already had a reference and were not retried.
    pub skipped: Vec<String>,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchSummary {
    /// Whether the booking ends up with at least one meeting reference.
    pub fn has_reference(&self) -> bool {
        !self.created.is_empty() || !self.skipped.is_empty()
    }
}

/// Provisions external meetings for a confirmed booking.
///
/// Every configured integration is attempted concurrently and independently;
/// each success is persisted as one `BookingReference`. Re-running for the same
/// booking only attempts integrations that have no reference yet.
pub struct CalendarEventDispatcher {
    pool: SqlitePool,
    integrations: Arc<dyn IntegrationProvider>,
}

impl CalendarEventDispatcher {
    pub fn new(pool: SqlitePool, integrations: Arc<dyn IntegrationProvider>) -> Self {
        Self { pool, integrations }
    }

    pub async fn dispatch(&self, booking: &Booking, event: &CalendarEvent) -> AppResult<DispatchSummary> {
        let integrations = self.integrations.integrations_for(&booking.user_id).await?;
        let existing = BookingReferenceRepository::find_by_booking_id(&self.pool, booking.id).await?;

        let mut summary = DispatchSummary {
            booking_id: booking.id,
            ..Default::default()
        };

        let mut pending: Vec<Arc<dyn CalendarIntegration>> = Vec::new();
        for integration in integrations {
            let kind = integration.integration_type().to_string();
            if existing.iter().any(|r| r.integration_type == kind) {
                summary.skipped.push(kind);
            } else {
                pending.push(integration);
            }
        }

        let attempts = join_all(pending.iter().map(|integration| async move {
            (integration.integration_type().to_string(), integration.create_event(event).await)
        }))
        .await;

        for (integration_type, result) in attempts {
            match result {
                Ok(created) => {
                    let reference = CreateBookingReference {
                        booking_id: booking.id,
                        integration_type: integration_type.clone(),
                        external_uid: created.external_uid,
                        meeting_id: created.meeting_id,
                        meeting_url: created.meeting_url,
                        meeting_password: created.meeting_password,
                    };
                    match BookingReferenceRepository::create(&self.pool, reference).await {
                        Ok(Some(row)) => {
                            tracing::info!(
                                "Created {} meeting for booking_id={}",
                                integration_type,
                                booking.id
                            );
                            summary.created.push(row);
                        }
                        // A concurrent run recorded it first.
                        Ok(None) => summary.skipped.push(integration_type),
                        Err(e) => {
                            tracing::error!(
                                "Failed to persist {} reference for booking_id={}: {:?}",
                                integration_type,
                                booking.id,
                                e
                            );
                            summary.failures.push(DispatchFailure {
                                integration_type,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Integration {} failed for booking_id={}: {}",
                        integration_type,
                        booking.id,
                        e
                    );
                    summary.failures.push(DispatchFailure {
                        integration_type,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !summary.has_reference() {
            tracing::error!(
                "BookingCreatingMeetingFailed: booking_id={} uid={} has no meeting reference ({} integration failure(s))",
                booking.id,
                booking.uid,
                summary.failures.len()
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BookingRepository;
    use crate::test_support::{self, FakeIntegration, StaticIntegrations};

    async fn setup(
        integrations: Vec<Arc<FakeIntegration>>,
    ) -> (SqlitePool, CalendarEventDispatcher, Booking, CalendarEvent) {
        let pool = test_support::memory_pool().await;
        let seeded = test_support::seed_confirmed_booking(&pool, 60).await;
        let dispatcher = CalendarEventDispatcher::new(
            pool.clone(),
            Arc::new(StaticIntegrations::new(integrations)),
        );
        let booking = BookingRepository::find_by_id(&pool, seeded.booking_id)
            .await
            .unwrap()
            .unwrap();
        let event = test_support::event_for(&pool, seeded.booking_id).await;
        (pool, dispatcher, booking, event)
    }

    #[tokio::test]
    async fn one_success_one_failure() {
        let ok = Arc::new(FakeIntegration::succeeding("daily_video"));
        let bad = Arc::new(FakeIntegration::failing("zoom_video"));
        let (pool, dispatcher, booking, event) = setup(vec![ok.clone(), bad.clone()]).await;

        let summary = dispatcher.dispatch(&booking, &event).await.unwrap();

        assert_eq!(summary.created.len(), 1);
        assert_eq!(summary.created[0].integration_type, "daily_video");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].integration_type, "zoom_video");

        let refs = BookingReferenceRepository::find_by_booking_id(&pool, booking.id)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(ok.calls(), 1);
        assert_eq!(bad.calls(), 1);
    }

    #[tokio::test]
    async fn retry_only_attempts_integrations_without_reference() {
        let ok = Arc::new(FakeIntegration::succeeding("daily_video"));
        let bad = Arc::new(FakeIntegration::failing("zoom_video"));
        let (pool, dispatcher, booking, event) = setup(vec![ok.clone(), bad.clone()]).await;

        dispatcher.dispatch(&booking, &event).await.unwrap();
        let second = dispatcher.dispatch(&booking, &event).await.unwrap();

        assert!(second.created.is_empty());
        assert_eq!(second.skipped, vec!["daily_video".to_string()]);
        assert_eq!(second.failures.len(), 1);
        assert_eq!(ok.calls(), 1);
        assert_eq!(bad.calls(), 2);

        let refs = BookingReferenceRepository::find_by_booking_id(&pool, booking.id)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[tokio::test]
    async fn no_integrations_is_not_an_error() {
        let (_pool, dispatcher, booking, event) = setup(Vec::new()).await;
        let summary = dispatcher.dispatch(&booking, &event).await.unwrap();
        assert!(!summary.has_reference());
        assert!(summary.failures.is_empty());
    }
}
