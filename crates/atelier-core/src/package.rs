//! Packages: batches of generation jobs with a derived aggregate status.
//!
//! A package's status is recomputed from its live job records on every
//! reconciliation pass; it is never incremented in place. `derive_status`
//! is the whole policy, kept pure so it can be tested without storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;
use crate::{PackageId, UserId};

/// Seconds after package creation during which "no jobs yet" still counts
/// as a submission in flight rather than a failed batch.
pub const PACKAGE_GRACE_SECS: i64 = 300;

/// Aggregate status of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// Created; no jobs observed yet.
    Active,

    /// At least one job is still pending or processing.
    Generating,

    /// All jobs terminal, at least one completed.
    Completed,

    /// All jobs failed, or no jobs ever arrived.
    Failed,
}

impl PackageStatus {
    /// Whether reconciliation can still change this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A batch grouping of generation jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Unique package ID.
    pub id: PackageId,

    /// The owning user.
    pub user_id: UserId,

    /// Number of jobs the batch is expected to contain.
    pub total_expected: u32,

    /// Jobs that completed successfully (derived).
    pub generated_count: u32,

    /// Jobs that failed (derived).
    pub failed_count: u32,

    /// Aggregate status (derived).
    pub status: PackageStatus,

    /// When the package was created.
    pub created_at: DateTime<Utc>,

    /// When the package reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Package {
    /// Create a new empty package.
    #[must_use]
    pub fn new(user_id: UserId, total_expected: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: PackageId::generate(),
            user_id,
            total_expected,
            generated_count: 0,
            failed_count: 0,
            status: PackageStatus::Active,
            created_at: now,
            completed_at: None,
        }
    }
}

/// Per-status counts over a package's job records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Jobs still pending.
    pub pending: u32,

    /// Jobs still processing.
    pub processing: u32,

    /// Jobs completed successfully.
    pub completed: u32,

    /// Jobs failed.
    pub failed: u32,
}

impl JobCounts {
    /// Count job statuses.
    pub fn tally<I: IntoIterator<Item = JobStatus>>(statuses: I) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Total jobs observed.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.pending + self.processing + self.completed + self.failed
    }

    /// Whether any job is still non-terminal.
    #[must_use]
    pub const fn any_in_flight(&self) -> bool {
        self.pending > 0 || self.processing > 0
    }
}

/// Derive a package's status from its job counts and its age.
///
/// Rules, applied in order:
///
/// 1. no jobs and younger than the grace window → `Active`
/// 2. no jobs and past the grace window → `Failed` (submission never
///    happened)
/// 3. any pending/processing → `Generating`
/// 4. all terminal, all failed → `Failed`
/// 5. all terminal, at least one completed → `Completed` (partial success
///    counts)
#[must_use]
pub fn derive_status(counts: &JobCounts, elapsed_since_creation: Duration) -> PackageStatus {
    if counts.total() == 0 {
        if elapsed_since_creation < Duration::seconds(PACKAGE_GRACE_SECS) {
            return PackageStatus::Active;
        }
        return PackageStatus::Failed;
    }

    if counts.any_in_flight() {
        return PackageStatus::Generating;
    }

    if counts.completed == 0 {
        PackageStatus::Failed
    } else {
        PackageStatus::Completed
    }
}
