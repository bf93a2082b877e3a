//! Reconciliation engine: derives package status from job records.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use atelier_core::{derive_status, JobCounts, Package, PackageId};
use atelier_store::{Store, StoreError};

use crate::error::Result;
use crate::notify::{Notifier, PackageStatusChange};

/// Recomputes a package's aggregate status from the live set of its job
/// records. Never applies a delta to its own previous output, so duplicate
/// and concurrent invocations for the same package are harmless.
///
/// This engine never writes to the ledger or accounts; refunds belong to
/// the job lifecycle.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    /// Create a new reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Reconcile one package: fetch its jobs, derive status and counts,
    /// write only on change, notify only on change.
    ///
    /// Returns the updated package when something changed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the package doesn't exist.
    pub async fn reconcile(
        &self,
        package_id: &PackageId,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>> {
        let package = self
            .store
            .get_package(package_id)?
            .ok_or(StoreError::NotFound {
                entity: "package",
                id: package_id.to_string(),
            })?;

        let jobs = self.store.list_jobs_by_package(package_id)?;
        let counts = JobCounts::tally(jobs.iter().map(|job| job.status));
        let status = derive_status(&counts, now - package.created_at);

        let Some(updated) = self
            .store
            .reconcile_package_write(package_id, &counts, status, now)?
        else {
            return Ok(None);
        };

        tracing::info!(
            package_id = %package_id,
            status = ?updated.status,
            generated = %updated.generated_count,
            failed = %updated.failed_count,
            "package reconciled"
        );
        self.notifier
            .package_status_changed(&PackageStatusChange::from(&updated))
            .await;
        Ok(Some(updated))
    }

    /// Reconcile every package that has not yet settled. Errors on
    /// individual packages are logged, not propagated, so one bad row
    /// cannot stall the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the unsettled-package scan itself fails.
    pub async fn reconcile_all(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;
        for package in self.store.list_unsettled_packages()? {
            match self.reconcile(&package.id, now).await {
                Ok(Some(_)) => changed += 1,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        package_id = %package.id,
                        error = %err,
                        "package reconciliation failed"
                    );
                }
            }
        }
        Ok(changed)
    }
}
