//! Credit manager: the single writer for accounts and the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use atelier_core::{
    compute_available, CreditOp, JobRecord, LedgerTransaction, TransactionMetadata, UserId,
};
use atelier_store::Store;

use crate::error::Result;

/// Availability breakdown for a user, as shown to callers before they
/// submit work.
#[derive(Debug, Clone, Copy)]
pub struct Availability {
    /// Usable subscription allotment.
    pub subscription_remaining: i64,

    /// Sum of unexpired bundle remainders.
    pub bundle_total: i64,

    /// Total credits usable right now.
    pub total: i64,
}

/// Orchestrates atomic deduction and crediting across the account and the
/// ledger. All heavy lifting (fresh re-reads, allocation, the single
/// `WriteBatch`) lives in the store's compound operations; this layer adds
/// policy and observability.
#[derive(Clone)]
pub struct CreditManager {
    store: Arc<dyn Store>,
}

impl CreditManager {
    /// Create a new credit manager over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Compute a user's availability breakdown. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    pub fn availability(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<Availability> {
        let account = self
            .store
            .get_account(user_id)?
            .ok_or(atelier_store::StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            })?;
        let bundles = self.store.list_bundles(user_id)?;

        let subscription_remaining = account.subscription_remaining(now);
        let total = compute_available(&account, &bundles, now);
        Ok(Availability {
            subscription_remaining,
            bundle_total: total - subscription_remaining,
            total,
        })
    }

    /// Read-only affordability check. No side effects; the deduction
    /// re-verifies under its own lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    pub fn can_afford(&self, user_id: &UserId, amount: i64, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.availability(user_id, now)?.total >= amount)
    }

    /// Deduct credits for a generation job.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InsufficientCredits` with no partial change
    /// when availability is too low.
    pub fn deduct(
        &self,
        user_id: &UserId,
        amount: i64,
        metadata: TransactionMetadata,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction> {
        let tx = self
            .store
            .deduct_credits(user_id, amount, metadata, description, now)?;
        tracing::info!(
            user_id = %user_id,
            amount = %amount,
            balance_after = %tx.balance_after,
            transaction_id = %tx.id,
            "credits deducted"
        );
        Ok(tx)
    }

    /// Apply a credit-adding operation (renewal, bundle grant, refund).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    pub fn credit(
        &self,
        user_id: &UserId,
        op: &CreditOp,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction> {
        let tx = self.store.credit_account(user_id, op, now)?;
        tracing::info!(
            user_id = %user_id,
            amount = %tx.amount,
            kind = ?tx.kind,
            balance_after = %tx.balance_after,
            transaction_id = %tx.id,
            "credits added"
        );
        Ok(tx)
    }

    /// Refund the exact pre-deducted amount of a failed job.
    ///
    /// Called only by the terminal compare-and-set winner, which is what
    /// makes the refund exactly-once.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    pub fn refund_job(&self, job: &JobRecord, now: DateTime<Utc>) -> Result<()> {
        if job.unit_cost <= 0 {
            return Ok(());
        }
        let reason = job
            .error_message
            .clone()
            .unwrap_or_else(|| "job failed".into());
        self.credit(
            &job.user_id,
            &CreditOp::Refund {
                amount: job.unit_cost,
                job_id: job.id,
                reason,
            },
            now,
        )?;
        Ok(())
    }

    /// Settle expired bundle remainders for every account. Returns the
    /// number of `Expired` ledger rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn sweep_expired_bundles(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut settled = 0;
        for account in self.store.list_accounts()? {
            settled += self.store.expire_bundles(&account.user_id, now)?.len();
        }
        Ok(settled)
    }
}
