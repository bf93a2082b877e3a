//! Package status notification fan-out.

use async_trait::async_trait;

use atelier_core::{Package, PackageId, PackageStatus, UserId};

/// Event emitted when reconciliation changes a package's status or counts.
#[derive(Debug, Clone)]
pub struct PackageStatusChange {
    /// The package that changed.
    pub package_id: PackageId,

    /// The owning user.
    pub user_id: UserId,

    /// New aggregate status.
    pub status: PackageStatus,

    /// Jobs completed successfully.
    pub generated_count: u32,

    /// Jobs failed.
    pub failed_count: u32,

    /// Jobs the batch was expected to contain.
    pub total_count: u32,
}

impl From<&Package> for PackageStatusChange {
    fn from(package: &Package) -> Self {
        Self {
            package_id: package.id,
            user_id: package.user_id,
            status: package.status,
            generated_count: package.generated_count,
            failed_count: package.failed_count,
            total_count: package.total_expected,
        }
    }
}

/// Fan-out seam for package status changes. Delivery guarantees are the
/// implementation's concern; the reconciler only promises to call this
/// once per actual change.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a status change to interested parties.
    async fn package_status_changed(&self, change: &PackageStatusChange);
}

/// Default notifier: structured log lines only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn package_status_changed(&self, change: &PackageStatusChange) {
        tracing::info!(
            package_id = %change.package_id,
            user_id = %change.user_id,
            status = ?change.status,
            generated = %change.generated_count,
            failed = %change.failed_count,
            total = %change.total_count,
            "package status changed"
        );
    }
}
