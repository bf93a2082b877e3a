//! Credit account types and availability math.
//!
//! An account combines a subscription cycle allotment (`credits_limit` /
//! `credits_used`) with a purchased pool itemized as [`Bundle`] rows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Hours past cycle expiry during which the remaining allotment still
/// counts. Covers the gap between a cycle ending and the renewal webhook
/// landing, so users are not falsely declined at the boundary.
pub const RENEWAL_GRACE_HOURS: i64 = 24;

/// A per-user credit account.
///
/// `credits_balance` is the denormalized sum of unexpired bundle remainders;
/// every bundle mutation updates it in the same atomic batch. Availability
/// checks always recompute from the live bundle rows so an expired bundle
/// stops counting at its expiry instant, not at the next sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    /// The owning user.
    pub user_id: UserId,

    /// Cycle cap granted by the subscription.
    pub credits_limit: i64,

    /// Credits consumed from the allotment this cycle.
    pub credits_used: i64,

    /// Purchased pool: sum of unexpired bundle remainders.
    pub credits_balance: i64,

    /// End of the current subscription cycle, if any.
    pub cycle_expires_at: Option<DateTime<Utc>>,

    /// When the allotment was last renewed.
    pub last_renewal_at: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create a new account with no subscription and an empty pool.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            credits_limit: 0,
            credits_used: 0,
            credits_balance: 0,
            cycle_expires_at: None,
            last_renewal_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the subscription cycle still contributes at `now`.
    ///
    /// True while `now <= cycle_expires_at + RENEWAL_GRACE_HOURS`.
    #[must_use]
    pub fn cycle_active(&self, now: DateTime<Utc>) -> bool {
        self.cycle_expires_at
            .is_some_and(|expiry| now <= expiry + Duration::hours(RENEWAL_GRACE_HOURS))
    }

    /// Unconsumed subscription allotment usable at `now`.
    ///
    /// Zero once the grace window has passed without a renewal.
    #[must_use]
    pub fn subscription_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.cycle_active(now) {
            (self.credits_limit - self.credits_used).max(0)
        } else {
            0
        }
    }
}

/// Total credits usable at `now`: subscription contribution plus unexpired
/// bundle remainders.
///
/// Recomputes from the live bundle rows rather than trusting
/// `credits_balance`, so the check stays correct between expiry sweeps.
#[must_use]
pub fn compute_available(account: &CreditAccount, bundles: &[Bundle], now: DateTime<Utc>) -> i64 {
    let bundle_total: i64 = bundles
        .iter()
        .filter(|b| b.is_usable(now))
        .map(|b| b.remaining)
        .sum();
    account.subscription_remaining(now) + bundle_total
}
