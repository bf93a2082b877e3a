//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Bundle records, keyed by `user_id || bundle_id` so one prefix scan
    /// yields a user's bundles.
    pub const BUNDLES_BY_USER: &str = "bundles_by_user";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Job records, keyed by `job_id`.
    pub const JOBS: &str = "jobs";

    /// Index: provider job ID → `job_id`, for callback and poll resolution.
    pub const JOBS_BY_EXTERNAL: &str = "jobs_by_external";

    /// Index: jobs by package, keyed by `package_id || job_id`. Value is
    /// empty (index only).
    pub const JOBS_BY_PACKAGE: &str = "jobs_by_package";

    /// Package records, keyed by `package_id`.
    pub const PACKAGES: &str = "packages";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::BUNDLES_BY_USER,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::JOBS,
        cf::JOBS_BY_EXTERNAL,
        cf::JOBS_BY_PACKAGE,
        cf::PACKAGES,
    ]
}
