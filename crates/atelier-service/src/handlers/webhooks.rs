//! Provider webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use atelier_engine::CallbackPayload;

use crate::error::ApiError;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the callback was accepted.
    pub received: bool,
    /// Whether this delivery applied the terminal transition. `false`
    /// means a racing path (poll or timeout sweep) had already won; the
    /// duplicate is expected, not an error.
    pub applied: bool,
}

/// Handle the provider's push callback for a finished job.
pub async fn provider_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CallbackPayload>,
) -> Result<Json<WebhookResponse>, ApiError> {
    tracing::info!(
        external_job_id = %payload.external_job_id,
        status = ?payload.status,
        "received provider callback"
    );

    let applied = state.lifecycle.handle_callback(payload).await?.is_some();
    Ok(Json(WebhookResponse {
        received: true,
        applied,
    }))
}
