//! Ledger transaction types.
//!
//! Every balance change appends exactly one immutable transaction row; the
//! ledger is the source of truth for balance audits. Metadata is a closed
//! tagged union validated at write time rather than a free-form blob, so
//! the audit trail stays machine-checkable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BundleId, JobId, PackageId, TransactionId, UserId};

/// An immutable record of one signed credit movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction ID (ULID, time-ordered).
    pub id: TransactionId,

    /// The user whose availability changed.
    pub user_id: UserId,

    /// Kind of movement.
    pub kind: TransactionKind,

    /// Where the movement originated.
    pub source: TransactionSource,

    /// Signed amount: positive adds credits, negative removes them.
    pub amount: i64,

    /// Total availability immediately after this transaction, snapshotted
    /// inside the same atomic batch as the balance mutation.
    pub balance_after: i64,

    /// External reference (job ID for charges and refunds, bundle ID for
    /// grants and expiries).
    pub reference_id: Option<String>,

    /// Typed metadata for the movement.
    pub metadata: TransactionMetadata,

    /// Human-readable description.
    pub description: String,

    /// When the transaction was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Record credits earned from a renewal or bundle grant.
    #[must_use]
    pub fn earned(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        source: TransactionSource,
        metadata: TransactionMetadata,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Earned,
            source,
            amount,
            balance_after,
            reference_id: metadata.reference_id(),
            metadata,
            description,
            created_at: now,
        }
    }

    /// Record credits spent on a generation job. The stored amount is
    /// always negative.
    #[must_use]
    pub fn spent(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        metadata: TransactionMetadata,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Spent,
            source: TransactionSource::Generation,
            amount: -amount.abs(),
            balance_after,
            reference_id: metadata.reference_id(),
            metadata,
            description,
            created_at: now,
        }
    }

    /// Record a refund reversing a prior deduction.
    #[must_use]
    pub fn refunded(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        metadata: TransactionMetadata,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Refunded,
            source: TransactionSource::Refund,
            amount: amount.abs(),
            balance_after,
            reference_id: metadata.reference_id(),
            metadata,
            description,
            created_at: now,
        }
    }

    /// Record a bundle remainder lapsing at expiry. The stored amount is
    /// always negative.
    #[must_use]
    pub fn expired(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        bundle_id: BundleId,
        now: DateTime<Utc>,
    ) -> Self {
        let metadata = TransactionMetadata::BundleExpiry { bundle_id };
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: TransactionKind::Expired,
            source: TransactionSource::Expiry,
            amount: -amount.abs(),
            balance_after,
            reference_id: metadata.reference_id(),
            metadata,
            description: format!("{} unused credits expired", amount.abs()),
            created_at: now,
        }
    }
}

/// Kind of credit movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits granted (renewal or bundle purchase).
    Earned,

    /// Credits consumed by a generation job.
    Spent,

    /// Unused bundle credits lapsed at expiry.
    Expired,

    /// A prior deduction reversed after a failed job.
    Refunded,
}

impl TransactionKind {
    /// Whether this kind adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Earned | Self::Refunded)
    }

    /// Whether this kind removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Spent | Self::Expired)
    }
}

/// Where a credit movement originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Subscription cycle renewal.
    Subscription,

    /// One-time bundle purchase.
    Purchase,

    /// Generation job deduction.
    Generation,

    /// Automatic refund for a failed job.
    Refund,

    /// Bundle expiry sweep.
    Expiry,
}

/// Typed transaction metadata, one variant per movement shape.
///
/// Serialized with an explicit `type` tag so stored rows remain readable
/// when variants are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionMetadata {
    /// A job deduction.
    JobCharge {
        /// The job the credits were deducted for.
        job_id: JobId,
        /// Parent package, when the job belongs to a batch.
        package_id: Option<PackageId>,
    },

    /// A refund for a failed job.
    JobRefund {
        /// The job whose deduction is reversed.
        job_id: JobId,
        /// Why the job failed.
        reason: String,
    },

    /// A bundle grant.
    BundleGrant {
        /// The bundle created by the grant.
        bundle_id: BundleId,
        /// Payment reference from the purchase flow, if any.
        payment_ref: Option<String>,
    },

    /// A subscription cycle renewal.
    CycleRenewal {
        /// Cycle cap before the renewal.
        previous_limit: i64,
    },

    /// A bundle remainder lapsing.
    BundleExpiry {
        /// The bundle that expired.
        bundle_id: BundleId,
    },
}

impl TransactionMetadata {
    /// The external reference carried by this metadata, used to populate
    /// the transaction's `reference_id`.
    #[must_use]
    pub fn reference_id(&self) -> Option<String> {
        match self {
            Self::JobCharge { job_id, .. } | Self::JobRefund { job_id, .. } => {
                Some(job_id.to_string())
            }
            Self::BundleGrant { bundle_id, .. } | Self::BundleExpiry { bundle_id } => {
                Some(bundle_id.to_string())
            }
            Self::CycleRenewal { .. } => None,
        }
    }
}

/// A credit-adding operation applied by the credit manager.
#[derive(Debug, Clone)]
pub enum CreditOp {
    /// Reset the subscription cycle: new cap, zeroed consumption, new
    /// expiry.
    Renewal {
        /// Cycle cap for the new period.
        credits_limit: i64,
        /// End of the new period.
        cycle_expires_at: DateTime<Utc>,
    },

    /// Grant a purchased bundle.
    GrantBundle {
        /// Credits in the bundle.
        amount: i64,
        /// Bundle expiry.
        valid_until: DateTime<Utc>,
        /// Payment reference from the purchase flow, if any.
        payment_ref: Option<String>,
    },

    /// Reverse a prior job deduction.
    Refund {
        /// The exact amount originally deducted.
        amount: i64,
        /// The failed job being refunded.
        job_id: JobId,
        /// Why the job failed.
        reason: String,
    },
}

/// Filter for ledger history queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    /// Only transactions of this kind.
    pub kind: Option<TransactionKind>,

    /// Only transactions from this source.
    pub source: Option<TransactionSource>,

    /// Only transactions created at or after this instant.
    pub from: Option<DateTime<Utc>>,

    /// Only transactions created at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    /// Whether a transaction passes the filter.
    #[must_use]
    pub fn matches(&self, tx: &LedgerTransaction) -> bool {
        self.kind.map_or(true, |k| tx.kind == k)
            && self.source.map_or(true, |s| tx.source == s)
            && self.from.map_or(true, |from| tx.created_at >= from)
            && self.to.map_or(true, |to| tx.created_at <= to)
    }
}
