use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};

use crate::error::AppResult;
use crate::routes::auth::OperatorKey;
use crate::services::reminders::ReminderRunSummary;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    // GET is kept for schedulers that can only issue plain requests.
    Router::new().route("/reminders", post(run_reminders).get(run_reminders))
}

/// Run one reminder pass over the configured lead times.
async fn run_reminders(
    State(state): State<Arc<AppState>>,
    _key: OperatorKey,
) -> AppResult<Json<ReminderRunSummary>> {
    tracing::info!(
        "Reminder trigger received: lead_times={:?}",
        state.reminders.lead_times_minutes()
    );
    let summary = state.reminders.run(chrono::Utc::now().naive_utc()).await?;
    Ok(Json(summary))
}
