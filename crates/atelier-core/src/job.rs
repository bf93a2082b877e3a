//! Generation job records and their terminal-state machine.
//!
//! A job is one unit of externally-computed work. It is created `Pending`
//! at submission, becomes `Processing` once the provider acknowledges it,
//! and reaches exactly one terminal state. Three independent triggers race
//! to apply the terminal transition (push callback, recovery poll, timeout
//! sweep); the store's compare-and-set guard lets exactly one win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{JobId, PackageId, UserId};

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet acknowledged by the provider.
    Pending,

    /// Acknowledged by the provider; an external job ID exists.
    Processing,

    /// Finished successfully; results are stored.
    Completed,

    /// Finished unsuccessfully; credits were refunded.
    Failed,
}

impl JobStatus {
    /// Whether this status permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One asynchronous unit of externally-computed generation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID.
    pub id: JobId,

    /// The user charged for the job.
    pub user_id: UserId,

    /// Parent package, when the job belongs to a batch.
    pub package_id: Option<PackageId>,

    /// Current status.
    pub status: JobStatus,

    /// Provider-side job ID, set once the provider acknowledges.
    pub external_job_id: Option<String>,

    /// Credits deducted for this job at submission.
    pub unit_cost: i64,

    /// References to produced artifacts (set on completion).
    pub result_refs: Vec<String>,

    /// Failure detail (set on failure).
    pub error_message: Option<String>,

    /// When the job was submitted.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new pending job.
    #[must_use]
    pub fn new(
        user_id: UserId,
        unit_cost: i64,
        package_id: Option<PackageId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            user_id,
            package_id,
            status: JobStatus::Pending,
            external_job_id: None,
            unit_cost,
            result_refs: Vec::new(),
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Whether the job has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The terminal result of a job, carried identically by the push callback,
/// the poll response, and the timeout sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    /// The provider produced artifacts.
    Completed {
        /// References to the produced artifacts.
        result_refs: Vec<String>,
    },

    /// The job failed; the deduction is refunded.
    Failed {
        /// Failure detail.
        error: String,
    },
}

impl TerminalOutcome {
    /// The job status this outcome maps to.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Whether this outcome triggers a refund.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Which trigger delivered a terminal outcome. Logged with every terminal
/// transition so racing paths can be audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSource {
    /// Push notification from the provider.
    Callback,

    /// Scheduled recovery poll against the provider.
    Poll,

    /// Timeout sweep forcing a stuck job to failure.
    TimeoutSweep,

    /// Submission-time failure before an external job ID existed.
    Submission,
}

impl fmt::Display for TerminalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Callback => "callback",
            Self::Poll => "poll",
            Self::TimeoutSweep => "timeout_sweep",
            Self::Submission => "submission",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = JobRecord::new(UserId::generate(), 5, None, Utc::now());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_terminal());
        assert!(job.external_job_id.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn outcome_maps_to_status() {
        let done = TerminalOutcome::Completed {
            result_refs: vec!["s3://out/1.png".into()],
        };
        assert_eq!(done.status(), JobStatus::Completed);
        assert!(!done.is_failure());

        let failed = TerminalOutcome::Failed {
            error: "NSFW filter".into(),
        };
        assert_eq!(failed.status(), JobStatus::Failed);
        assert!(failed.is_failure());
    }

    #[test]
    fn outcome_serde_tag() {
        let failed = TerminalOutcome::Failed {
            error: "boom".into(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"outcome\":\"failed\""));
    }
}
