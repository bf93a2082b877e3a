//! Background sweeps: recovery poll, timeout, reconcile, bundle expiry.
//!
//! Each sweep is a stateless tick over the durable tables: nothing is kept
//! in process memory between runs, so restarts lose nothing and multiple
//! workers can run the same sweeps against one store. The `*_tick`
//! functions are public so tests can drive a single pass with a controlled
//! clock position.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use atelier_core::{JobStatus, TerminalOutcome, TerminalSource};
use atelier_store::Store;

use crate::credits::CreditManager;
use crate::error::Result;
use crate::lifecycle::JobLifecycle;
use crate::provider::ComputeProvider;
use crate::reconcile::Reconciler;

/// Tunables for the background sweeps.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How long a dispatched job may go without a callback before the
    /// recovery poll starts asking the provider directly.
    pub poll_after: Duration,

    /// How long a job may stay non-terminal before the timeout sweep
    /// forces it to `Failed`.
    pub job_timeout: Duration,

    /// Interval between recovery poll ticks.
    pub poll_interval: Duration,

    /// Interval between timeout ticks.
    pub timeout_interval: Duration,

    /// Interval between reconcile ticks.
    pub reconcile_interval: Duration,

    /// Interval between bundle expiry ticks.
    pub expiry_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            poll_after: Duration::from_secs(120),
            job_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(60),
            timeout_interval: Duration::from_secs(5 * 60),
            reconcile_interval: Duration::from_secs(60),
            expiry_interval: Duration::from_secs(60 * 60),
        }
    }
}

fn chrono_duration(duration: Duration) -> ChronoDuration {
    // Out-of-range only for absurd configs; cap instead of panicking.
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(365_000))
}

/// One recovery-poll pass: ask the provider about dispatched jobs that
/// have gone quiet, and apply any terminal outcome it reports.
///
/// Returns the number of jobs driven terminal.
///
/// # Errors
///
/// Returns an error only if the job scan itself fails; per-job provider
/// errors are logged and skipped so one flaky job cannot stall the sweep.
pub async fn poll_tick(
    store: &Arc<dyn Store>,
    provider: &Arc<dyn ComputeProvider>,
    lifecycle: &JobLifecycle,
    config: &SweepConfig,
) -> Result<usize> {
    let now = Utc::now();
    let cutoff = now - chrono_duration(config.poll_after);

    let mut resolved = 0;
    for job in store.list_unresolved_jobs(cutoff)? {
        // Pending jobs have no external ID to poll; the timeout sweep owns
        // them.
        let Some(external_job_id) = job.external_job_id.clone() else {
            continue;
        };
        if job.status != JobStatus::Processing {
            continue;
        }

        match provider.fetch_job(&external_job_id).await {
            Ok(Some(outcome)) => {
                if lifecycle
                    .apply_terminal(&job.id, &outcome, TerminalSource::Poll)
                    .await?
                    .is_some()
                {
                    resolved += 1;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    job_id = %job.id,
                    external_job_id = %external_job_id,
                    error = %err,
                    "recovery poll failed for job"
                );
            }
        }
    }
    Ok(resolved)
}

/// One timeout pass: force jobs stuck past `job_timeout` to `Failed`,
/// which refunds them through the normal terminal path.
///
/// Returns the number of jobs timed out.
///
/// # Errors
///
/// Returns an error if the job scan fails.
pub async fn timeout_tick(
    store: &Arc<dyn Store>,
    lifecycle: &JobLifecycle,
    config: &SweepConfig,
) -> Result<usize> {
    let now = Utc::now();
    let cutoff = now - chrono_duration(config.job_timeout);

    let mut timed_out = 0;
    for job in store.list_unresolved_jobs(cutoff)? {
        let outcome = TerminalOutcome::Failed {
            error: format!(
                "timed out: no terminal outcome within {}s",
                config.job_timeout.as_secs()
            ),
        };
        if lifecycle
            .apply_terminal(&job.id, &outcome, TerminalSource::TimeoutSweep)
            .await?
            .is_some()
        {
            timed_out += 1;
        }
    }
    Ok(timed_out)
}

/// Spawn all four sweeps as detached interval loops.
pub fn spawn_sweeps(
    store: Arc<dyn Store>,
    provider: Arc<dyn ComputeProvider>,
    lifecycle: Arc<JobLifecycle>,
    reconciler: Reconciler,
    credits: CreditManager,
    config: SweepConfig,
) {
    {
        let store = store.clone();
        let provider = provider.clone();
        let lifecycle = lifecycle.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            loop {
                ticker.tick().await;
                match poll_tick(&store, &provider, &lifecycle, &config).await {
                    Ok(0) => {}
                    Ok(resolved) => {
                        tracing::info!(resolved, "recovery poll resolved jobs");
                    }
                    Err(err) => tracing::error!(error = %err, "recovery poll tick failed"),
                }
            }
        });
    }

    {
        let store = store.clone();
        let lifecycle = lifecycle.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.timeout_interval);
            loop {
                ticker.tick().await;
                match timeout_tick(&store, &lifecycle, &config).await {
                    Ok(0) => {}
                    Ok(timed_out) => {
                        tracing::warn!(timed_out, "timeout sweep failed stuck jobs");
                    }
                    Err(err) => tracing::error!(error = %err, "timeout tick failed"),
                }
            }
        });
    }

    {
        let interval = config.reconcile_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = reconciler.reconcile_all(Utc::now()).await {
                    tracing::error!(error = %err, "reconcile tick failed");
                }
            }
        });
    }

    {
        let interval = config.expiry_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match credits.sweep_expired_bundles(Utc::now()) {
                    Ok(0) => {}
                    Ok(settled) => tracing::info!(settled, "bundle expiry sweep settled rows"),
                    Err(err) => tracing::error!(error = %err, "bundle expiry tick failed"),
                }
            }
        });
    }
}
