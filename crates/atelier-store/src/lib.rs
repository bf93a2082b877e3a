//! `RocksDB` storage layer for atelier.
//!
//! This crate provides persistent storage for accounts, bundles, ledger
//! transactions, jobs, and packages using `RocksDB` with column families.
//!
//! # Atomicity and serialization
//!
//! Compound operations (`deduct_credits`, `credit_account`,
//! `expire_bundles`, `apply_job_terminal`) re-read state fresh, verify,
//! and commit a single `WriteBatch`, so a balance never changes without
//! its ledger row and vice versa. All balance-bearing mutations for a
//! user serialize on a per-user lock; package reconciliation writes
//! serialize on a per-package lock. That is the entire concurrency story:
//! no caller-side locking is required.
//!
//! # Example
//!
//! ```no_run
//! use atelier_store::{RocksStore, Store};
//! use atelier_core::{CreditAccount, UserId};
//! use chrono::Utc;
//!
//! let store = RocksStore::open("/tmp/atelier-db").unwrap();
//!
//! let user_id = UserId::generate();
//! let account = CreditAccount::new(user_id, Utc::now());
//! store.create_account(&account).unwrap();
//!
//! let retrieved = store.get_account(&user_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use atelier_core::{
    Bundle, CreditAccount, CreditOp, JobCounts, JobId, JobRecord, LedgerTransaction, Package,
    PackageId, PackageStatus, TerminalOutcome, TransactionFilter, TransactionId,
    TransactionMetadata, UserId,
};

/// Result of a terminal compare-and-set on a job.
#[derive(Debug, Clone)]
pub enum TerminalApplied {
    /// This caller won the race; the transition and its record are stored.
    Applied(JobRecord),

    /// The job was already terminal; nothing was written. Carries the
    /// stored record so callers can log the duplicate delivery.
    AlreadyTerminal(JobRecord),
}

/// Result of recording provider acknowledgement of a job.
#[derive(Debug, Clone)]
pub enum DispatchApplied {
    /// The job moved `Pending → Processing` with the external ID recorded.
    Applied(JobRecord),

    /// The job was already terminal (e.g. timeout-swept first); nothing
    /// was written.
    AlreadyTerminal(JobRecord),
}

/// The storage trait defining all database operations.
///
/// This abstracts the storage layer so the engine can run against other
/// implementations (e.g. in-memory for tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountExists` if the user already has one.
    fn create_account(&self, account: &CreditAccount) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>>;

    /// List all accounts (used by the bundle-expiry sweep).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_accounts(&self) -> Result<Vec<CreditAccount>>;

    /// List a user's bundles, unsorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_bundles(&self, user_id: &UserId) -> Result<Vec<Bundle>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Get a ledger transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId)
        -> Result<Option<LedgerTransaction>>;

    /// List a user's transactions, newest first, with filter and
    /// pagination applied after filtering.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        user_id: &UserId,
        filter: &TransactionFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    // =========================================================================
    // Credit Compound Operations
    // =========================================================================

    /// Deduct credits atomically: fresh re-read, availability check,
    /// allocation (subscription first, then bundles oldest-expiry-first),
    /// one ledger row. Serialized per user.
    ///
    /// Returns the written ledger row.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if availability is too low; no
    ///   partial deduction occurs.
    /// - `StoreError::InvalidAmount` if `amount` is not positive.
    fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        metadata: TransactionMetadata,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction>;

    /// Apply a credit-adding operation (renewal, bundle grant, or refund)
    /// atomically with its ledger row. Serialized per user.
    ///
    /// Returns the written ledger row.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InvalidAmount` for non-positive grant/refund amounts.
    fn credit_account(
        &self,
        user_id: &UserId,
        op: &CreditOp,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction>;

    /// Convert expired bundle remainders into `Expired` ledger rows and
    /// zero them, in one batch. Serialized per user.
    ///
    /// Returns the written rows (empty when nothing had expired).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn expire_bundles(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<Vec<LedgerTransaction>>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert a new job record, maintaining the package index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_job(&self, job: &JobRecord) -> Result<()>;

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>>;

    /// Resolve a job through the provider's external job ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job_by_external(&self, external_job_id: &str) -> Result<Option<JobRecord>>;

    /// List all jobs linked to a package.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_package(&self, package_id: &PackageId) -> Result<Vec<JobRecord>>;

    /// List non-terminal jobs created before the cutoff. Drives the
    /// recovery poll and the timeout sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_unresolved_jobs(&self, created_before: DateTime<Utc>) -> Result<Vec<JobRecord>>;

    /// Record provider acknowledgement: `Pending → Processing` plus the
    /// external-ID index row. A no-op if the job already went terminal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn mark_job_dispatched(&self, job_id: &JobId, external_job_id: &str)
        -> Result<DispatchApplied>;

    /// Apply a terminal outcome behind the compare-and-set guard: only a
    /// still-non-terminal job transitions; otherwise nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn apply_job_terminal(
        &self,
        job_id: &JobId,
        outcome: &TerminalOutcome,
        now: DateTime<Utc>,
    ) -> Result<TerminalApplied>;

    // =========================================================================
    // Package Operations
    // =========================================================================

    /// Insert a new package record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_package(&self, package: &Package) -> Result<()>;

    /// Get a package by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_package(&self, package_id: &PackageId) -> Result<Option<Package>>;

    /// List packages whose status is not yet terminal (reconcile sweep
    /// input).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_unsettled_packages(&self) -> Result<Vec<Package>>;

    /// Write reconciliation output if it differs from the stored row.
    /// Serialized per package; returns the updated package only when
    /// status or counts actually changed, so side effects fire once.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the package doesn't exist.
    fn reconcile_package_write(
        &self,
        package_id: &PackageId,
        counts: &JobCounts,
        status: PackageStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>>;
}
