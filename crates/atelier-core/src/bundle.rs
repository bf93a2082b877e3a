//! Purchased credit bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BundleId, UserId};

/// A purchased batch of credits with its own expiration.
///
/// Bundles are consumed oldest-expiry-first so credits closest to expiring
/// are spent before longer-lived ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Unique bundle ID.
    pub id: BundleId,

    /// The owning user.
    pub user_id: UserId,

    /// Credits originally granted.
    pub amount: i64,

    /// Credits still unconsumed.
    pub remaining: i64,

    /// Expiry instant; the bundle contributes nothing past this.
    pub valid_until: DateTime<Utc>,

    /// When the bundle was granted.
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Create a new full bundle.
    #[must_use]
    pub fn new(user_id: UserId, amount: i64, valid_until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: BundleId::generate(),
            user_id,
            amount,
            remaining: amount,
            valid_until,
            created_at: now,
        }
    }

    /// Whether the bundle has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }

    /// Whether the bundle can still be consumed at `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 && !self.is_expired(now)
    }
}

/// Sort bundles into consumption order: oldest expiry first, creation time
/// as a tiebreak.
pub fn sort_for_consumption(bundles: &mut [Bundle]) {
    bundles.sort_by_key(|b| (b.valid_until, b.created_at));
}
