//! Credit balance, history, and grant handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{
    CreditOp, LedgerTransaction, TransactionFilter, TransactionKind, TransactionSource, UserId,
};
use atelier_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Total credits usable right now.
    pub available: i64,
    /// Usable subscription allotment.
    pub subscription_remaining: i64,
    /// Sum of unexpired bundle remainders.
    pub bundle_total: i64,
}

/// Get a user's current availability.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let availability = state.credits.availability(&user_id, Utc::now())?;
    Ok(Json(BalanceResponse {
        available: availability.total,
        subscription_remaining: availability.subscription_remaining,
        bundle_total: availability.bundle_total,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
    /// Only transactions of this kind.
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    /// Only transactions from this source.
    #[serde(default)]
    pub source: Option<TransactionSource>,
    /// Only transactions at or after this instant.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Only transactions at or before this instant.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Signed amount.
    pub amount: i64,
    /// Kind of movement.
    pub kind: TransactionKind,
    /// Where the movement originated.
    pub source: TransactionSource,
    /// Availability after this transaction.
    pub balance_after: i64,
    /// External reference, if any.
    pub reference_id: Option<String>,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerTransaction> for TransactionResponse {
    fn from(tx: &LedgerTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            kind: tx.kind,
            source: tx.source,
            balance_after: tx.balance_after,
            reference_id: tx.reference_id.clone(),
            description: tx.description.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List a user's ledger history, filtered and paginated.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    // Verify the account exists so an empty page is distinguishable from a
    // missing user.
    state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let filter = TransactionFilter {
        kind: query.kind,
        source: query.source,
        from: query.from,
        to: query.to,
    };

    // Fetch one more than requested to determine has_more.
    let limit = query.limit.min(100);
    let transactions = state
        .store
        .list_transactions(&user_id, &filter, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// A credit grant from the platform billing collaborator.
#[derive(Debug, Deserialize)]
#[serde(tag = "grant", rename_all = "snake_case")]
pub enum GrantKind {
    /// Subscription cycle renewal.
    Renewal {
        /// New cycle cap.
        credits_limit: i64,
        /// End of the new cycle.
        cycle_expires_at: DateTime<Utc>,
    },
    /// Purchased bundle.
    Bundle {
        /// Credits in the bundle.
        amount: i64,
        /// Bundle expiry.
        valid_until: DateTime<Utc>,
        /// Payment reference, if any.
        #[serde(default)]
        payment_ref: Option<String>,
    },
}

/// Grant request.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// The user to credit.
    pub user_id: String,
    /// What to grant.
    #[serde(flatten)]
    pub kind: GrantKind,
}

/// Grant response.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    /// The written ledger row ID.
    pub transaction_id: String,
    /// Credits granted.
    pub amount: i64,
    /// Availability after the grant.
    pub balance_after: i64,
}

/// Apply a renewal or bundle grant.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let op = match body.kind {
        GrantKind::Renewal {
            credits_limit,
            cycle_expires_at,
        } => CreditOp::Renewal {
            credits_limit,
            cycle_expires_at,
        },
        GrantKind::Bundle {
            amount,
            valid_until,
            payment_ref,
        } => CreditOp::GrantBundle {
            amount,
            valid_until,
            payment_ref,
        },
    };

    let tx = state.credits.credit(&user_id, &op, Utc::now())?;
    Ok(Json(GrantResponse {
        transaction_id: tx.id.to_string(),
        amount: tx.amount,
        balance_after: tx.balance_after,
    }))
}
