//! Job lifecycle: submission and the single terminal-transition entry
//! point.
//!
//! Three triggers race to finish a job — the provider's push callback, the
//! recovery poll, and the timeout sweep. All of them call
//! [`JobLifecycle::apply_terminal`]; the store's compare-and-set guard
//! picks one winner, and only the winner's side effects (result storage or
//! refund, then reconciliation) run. The losers observe an
//! already-terminal record and do nothing.

use std::sync::Arc;

use chrono::Utc;

use atelier_core::{
    JobId, JobRecord, PackageId, TerminalOutcome, TerminalSource, TransactionMetadata, UserId,
};
use atelier_store::{DispatchApplied, Store, StoreError, TerminalApplied};

use crate::credits::CreditManager;
use crate::error::{EngineError, Result};
use crate::provider::{CallbackPayload, ComputeProvider, GenerationRequest};
use crate::reconcile::Reconciler;

/// A submission from the caller boundary.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// The user paying for the job.
    pub user_id: UserId,

    /// Credits to deduct up front.
    pub unit_cost: i64,

    /// Parent package, when the job belongs to a batch.
    pub package_id: Option<PackageId>,

    /// Generation parameters forwarded to the provider.
    pub request: GenerationRequest,
}

/// Owns job submission and terminal transitions.
pub struct JobLifecycle {
    store: Arc<dyn Store>,
    provider: Arc<dyn ComputeProvider>,
    credits: CreditManager,
    reconciler: Reconciler,
}

impl JobLifecycle {
    /// Create a new lifecycle over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn ComputeProvider>,
        credits: CreditManager,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            store,
            provider,
            credits,
            reconciler,
        }
    }

    /// Submit a generation job: deduct credits, record the job, hand it to
    /// the provider.
    ///
    /// The deduction commits before the provider call so no account lock
    /// is held across the network; a provider failure rolls the job into
    /// the normal failed-terminal path, which refunds the deduction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientCredits` if the user cannot afford the
    ///   job; nothing is recorded.
    /// - `EngineError::Submission` if the provider rejected the job; the
    ///   job record is failed and refunded.
    pub async fn submit(&self, req: SubmitRequest) -> Result<JobRecord> {
        let now = Utc::now();

        if let Some(package_id) = &req.package_id {
            if self.store.get_package(package_id)?.is_none() {
                return Err(EngineError::Store(StoreError::NotFound {
                    entity: "package",
                    id: package_id.to_string(),
                }));
            }
        }

        let job = JobRecord::new(req.user_id, req.unit_cost, req.package_id, now);
        self.credits.deduct(
            &req.user_id,
            req.unit_cost,
            TransactionMetadata::JobCharge {
                job_id: job.id,
                package_id: req.package_id,
            },
            "Generation job",
            now,
        )?;
        self.store.create_job(&job)?;

        match self.provider.create_job(job.id, &req.request).await {
            Ok(external_job_id) => {
                let dispatched = self.store.mark_job_dispatched(&job.id, &external_job_id)?;
                let job = match dispatched {
                    DispatchApplied::Applied(job) => {
                        tracing::info!(
                            job_id = %job.id,
                            external_job_id = %external_job_id,
                            user_id = %job.user_id,
                            "job dispatched to provider"
                        );
                        job
                    }
                    DispatchApplied::AlreadyTerminal(job) => job,
                };
                Ok(job)
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    error = %err,
                    "provider rejected job at submission"
                );
                let outcome = TerminalOutcome::Failed {
                    error: format!("submission to provider failed: {err}"),
                };
                self.apply_terminal(&job.id, &outcome, TerminalSource::Submission)
                    .await?;
                Err(EngineError::Submission {
                    job_id: job.id,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Apply a terminal outcome to a job. The one entry point shared by
    /// the callback handler, the recovery poll, the timeout sweep, and
    /// submission failure.
    ///
    /// Returns the updated job when this call won the compare-and-set,
    /// `None` when the job was already terminal (a logged no-op).
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - Refund or reconciliation failures propagate; the terminal state
    ///   itself is already committed at that point.
    pub async fn apply_terminal(
        &self,
        job_id: &JobId,
        outcome: &TerminalOutcome,
        source: TerminalSource,
    ) -> Result<Option<JobRecord>> {
        let now = Utc::now();

        let job = match self.store.apply_job_terminal(job_id, outcome, now)? {
            TerminalApplied::AlreadyTerminal(job) => {
                tracing::debug!(
                    job_id = %job.id,
                    status = %job.status,
                    source = %source,
                    "duplicate terminal delivery ignored"
                );
                return Ok(None);
            }
            TerminalApplied::Applied(job) => job,
        };

        tracing::info!(
            job_id = %job.id,
            user_id = %job.user_id,
            status = %job.status,
            source = %source,
            "job reached terminal state"
        );

        if outcome.is_failure() {
            self.credits.refund_job(&job, now)?;
        }

        if let Some(package_id) = &job.package_id {
            self.reconciler.reconcile(package_id, now).await?;
        }

        Ok(Some(job))
    }

    /// Handle a push callback from the provider.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownExternalJob` if the external job ID
    /// was never recorded.
    pub async fn handle_callback(&self, payload: CallbackPayload) -> Result<Option<JobRecord>> {
        let job = self
            .store
            .get_job_by_external(&payload.external_job_id)?
            .ok_or_else(|| EngineError::UnknownExternalJob {
                external_job_id: payload.external_job_id.clone(),
            })?;

        let outcome = payload.into_outcome();
        self.apply_terminal(&job.id, &outcome, TerminalSource::Callback)
            .await
    }
}
