//! Account handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use atelier_core::{CreditAccount, UserId};
use atelier_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// The user to create an account for.
    pub user_id: String,
}

/// Account response with the availability breakdown.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// The owning user.
    pub user_id: String,
    /// Cycle cap.
    pub credits_limit: i64,
    /// Consumed this cycle.
    pub credits_used: i64,
    /// Usable subscription allotment right now.
    pub subscription_remaining: i64,
    /// Sum of unexpired bundle remainders.
    pub bundle_total: i64,
    /// Total credits usable right now.
    pub available: i64,
    /// End of the current cycle, if any.
    pub cycle_expires_at: Option<String>,
    /// Last renewal instant, if any.
    pub last_renewal_at: Option<String>,
}

/// Create a new credit account.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let now = Utc::now();
    let account = CreditAccount::new(user_id, now);
    state.store.create_account(&account)?;

    tracing::info!(user_id = %user_id, "account created");
    account_response(&state, &account)
}

/// Get an account with its availability breakdown.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let account = state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    account_response(&state, &account)
}

fn account_response(
    state: &AppState,
    account: &CreditAccount,
) -> Result<Json<AccountResponse>, ApiError> {
    let availability = state.credits.availability(&account.user_id, Utc::now())?;
    Ok(Json(AccountResponse {
        user_id: account.user_id.to_string(),
        credits_limit: account.credits_limit,
        credits_used: account.credits_used,
        subscription_remaining: availability.subscription_remaining,
        bundle_total: availability.bundle_total,
        available: availability.total,
        cycle_expires_at: account.cycle_expires_at.map(|t| t.to_rfc3339()),
        last_renewal_at: account.last_renewal_at.map(|t| t.to_rfc3339()),
    }))
}
