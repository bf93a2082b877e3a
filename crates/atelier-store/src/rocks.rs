//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait. Compound operations follow one shape: acquire the entity lock,
//! re-read state fresh, verify, stage every mutation plus its ledger row in
//! a single `WriteBatch`, commit.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use atelier_core::{
    bundle::sort_for_consumption, compute_available, Bundle, CreditAccount, CreditOp, JobCounts,
    JobId, JobRecord, JobStatus, LedgerTransaction, Package, PackageId, PackageStatus,
    TerminalOutcome, TransactionFilter, TransactionId, TransactionMetadata, TransactionSource,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{DispatchApplied, Store, TerminalApplied};

/// Horizon for refund bundles when the user has no live cycle to anchor
/// them to.
const REFUND_BUNDLE_DAYS: i64 = 30;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    package_locks: DashMap<PackageId, Arc<Mutex<()>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            user_locks: DashMap::new(),
            package_locks: DashMap::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// The serialization lock for a user's balance-bearing records.
    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(*user_id).or_default().clone()
    }

    /// The serialization lock for a package's reconciliation writes.
    fn package_lock(&self, package_id: &PackageId) -> Arc<Mutex<()>> {
        self.package_locks.entry(*package_id).or_default().clone()
    }

    /// Load an account or fail with a typed not-found.
    fn must_get_account(&self, user_id: &UserId) -> Result<CreditAccount> {
        self.get_account(user_id)?.ok_or(StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        })
    }

    /// Load a job or fail with a typed not-found.
    fn must_get_job(&self, job_id: &JobId) -> Result<JobRecord> {
        self.get_job(job_id)?.ok_or(StoreError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        })
    }

    /// Stage a ledger transaction and its user index entry.
    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &LedgerTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let value = Self::serialize(tx)?;
        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), &value);
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&tx.user_id, &tx.id),
            [],
        );
        Ok(())
    }

    /// Stage an account record.
    fn stage_account(&self, batch: &mut WriteBatch, account: &CreditAccount) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let value = Self::serialize(account)?;
        batch.put_cf(&cf_accounts, keys::account_key(&account.user_id), &value);
        Ok(())
    }

    /// Stage a bundle record.
    fn stage_bundle(&self, batch: &mut WriteBatch, bundle: &Bundle) -> Result<()> {
        let cf_bundles = self.cf(cf::BUNDLES_BY_USER)?;
        let value = Self::serialize(bundle)?;
        batch.put_cf(
            &cf_bundles,
            keys::bundle_key(&bundle.user_id, &bundle.id),
            &value,
        );
        Ok(())
    }

    /// Stage a job record.
    fn stage_job(&self, batch: &mut WriteBatch, job: &JobRecord) -> Result<()> {
        let cf_jobs = self.cf(cf::JOBS)?;
        let value = Self::serialize(job)?;
        batch.put_cf(&cf_jobs, keys::job_key(&job.id), &value);
        Ok(())
    }

    /// Commit a batch.
    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, account: &CreditAccount) -> Result<()> {
        let lock = self.user_lock(&account.user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.get_account(&account.user_id)?.is_some() {
            return Err(StoreError::AccountExists {
                user_id: account.user_id.to_string(),
            });
        }

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, account)?;
        self.write(batch)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .get_cf(&cf, keys::account_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_accounts(&self) -> Result<Vec<CreditAccount>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            accounts.push(Self::deserialize(&value)?);
        }
        Ok(accounts)
    }

    fn list_bundles(&self, user_id: &UserId) -> Result<Vec<Bundle>> {
        let cf = self.cf(cf::BUNDLES_BY_USER)?;
        let prefix = keys::user_bundles_prefix(user_id);

        let mut bundles = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            bundles.push(Self::deserialize(&value)?);
        }
        Ok(bundles)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        filter: &TransactionFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        // ULID keys sort oldest-first; collect then reverse for newest-first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut transactions = Vec::new();
        let mut skipped = 0;
        for key in all_keys {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            let Some(tx) = self.get_transaction(&tx_id)? else {
                continue;
            };
            if !filter.matches(&tx) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            transactions.push(tx);
        }
        Ok(transactions)
    }

    // =========================================================================
    // Credit Compound Operations
    // =========================================================================

    fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        metadata: TransactionMetadata,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.must_get_account(user_id)?;
        let mut bundles = self.list_bundles(user_id)?;

        let available = compute_available(&account, &bundles, now);
        if available < amount {
            return Err(StoreError::InsufficientCredits {
                available,
                required: amount,
            });
        }

        // Allocation: subscription allotment first, then bundles closest to
        // expiry.
        let from_subscription = amount.min(account.subscription_remaining(now));
        account.credits_used += from_subscription;
        let mut remainder = amount - from_subscription;

        sort_for_consumption(&mut bundles);
        let mut touched = Vec::new();
        for bundle in &mut bundles {
            if remainder == 0 {
                break;
            }
            if !bundle.is_usable(now) {
                continue;
            }
            let take = remainder.min(bundle.remaining);
            bundle.remaining -= take;
            account.credits_balance -= take;
            remainder -= take;
            touched.push(bundle.clone());
        }
        debug_assert_eq!(remainder, 0, "availability check bounds the allocation");

        account.updated_at = now;
        let balance_after = available - amount;
        let tx = LedgerTransaction::spent(
            *user_id,
            amount,
            balance_after,
            metadata,
            description.to_string(),
            now,
        );

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        for bundle in &touched {
            self.stage_bundle(&mut batch, bundle)?;
        }
        self.stage_transaction(&mut batch, &tx)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %user_id,
            amount = %amount,
            from_subscription = %from_subscription,
            balance_after = %balance_after,
            "credits deducted"
        );
        Ok(tx)
    }

    fn credit_account(
        &self,
        user_id: &UserId,
        op: &CreditOp,
        now: DateTime<Utc>,
    ) -> Result<LedgerTransaction> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.must_get_account(user_id)?;
        let bundles = self.list_bundles(user_id)?;
        let before = compute_available(&account, &bundles, now);

        let mut batch = WriteBatch::default();
        let tx = match op {
            CreditOp::Renewal {
                credits_limit,
                cycle_expires_at,
            } => {
                if *credits_limit < 0 {
                    return Err(StoreError::InvalidAmount(*credits_limit));
                }
                let previous_limit = account.credits_limit;
                // The earned amount is the availability delta, not the full
                // allotment: remaining grace-window credits are replaced,
                // not stacked.
                let earned = credits_limit - account.subscription_remaining(now);
                account.credits_limit = *credits_limit;
                account.credits_used = 0;
                account.cycle_expires_at = Some(*cycle_expires_at);
                account.last_renewal_at = Some(now);
                account.updated_at = now;

                LedgerTransaction::earned(
                    *user_id,
                    earned,
                    before + earned,
                    TransactionSource::Subscription,
                    TransactionMetadata::CycleRenewal { previous_limit },
                    format!("Cycle renewal: {credits_limit} credits"),
                    now,
                )
            }
            CreditOp::GrantBundle {
                amount,
                valid_until,
                payment_ref,
            } => {
                if *amount <= 0 {
                    return Err(StoreError::InvalidAmount(*amount));
                }
                let bundle = Bundle::new(*user_id, *amount, *valid_until, now);
                account.credits_balance += amount;
                account.updated_at = now;
                self.stage_bundle(&mut batch, &bundle)?;

                LedgerTransaction::earned(
                    *user_id,
                    *amount,
                    before + amount,
                    TransactionSource::Purchase,
                    TransactionMetadata::BundleGrant {
                        bundle_id: bundle.id,
                        payment_ref: payment_ref.clone(),
                    },
                    format!("Purchased bundle of {amount} credits"),
                    now,
                )
            }
            CreditOp::Refund {
                amount,
                job_id,
                reason,
            } => {
                if *amount <= 0 {
                    return Err(StoreError::InvalidAmount(*amount));
                }
                // Restore consumption the way it was taken: subscription
                // first, overflow into a refund bundle.
                let to_subscription = if account.cycle_active(now) {
                    (*amount).min(account.credits_used)
                } else {
                    0
                };
                account.credits_used -= to_subscription;
                let overflow = amount - to_subscription;
                if overflow > 0 {
                    let valid_until = account
                        .cycle_expires_at
                        .filter(|expiry| *expiry > now)
                        .unwrap_or(now + Duration::days(REFUND_BUNDLE_DAYS));
                    let bundle = Bundle::new(*user_id, overflow, valid_until, now);
                    account.credits_balance += overflow;
                    self.stage_bundle(&mut batch, &bundle)?;
                }
                account.updated_at = now;

                LedgerTransaction::refunded(
                    *user_id,
                    *amount,
                    before + amount,
                    TransactionMetadata::JobRefund {
                        job_id: *job_id,
                        reason: reason.clone(),
                    },
                    format!("Refund for failed job {job_id}"),
                    now,
                )
            }
        };

        self.stage_account(&mut batch, &account)?;
        self.stage_transaction(&mut batch, &tx)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %user_id,
            amount = %tx.amount,
            kind = ?tx.kind,
            balance_after = %tx.balance_after,
            "credits added"
        );
        Ok(tx)
    }

    fn expire_bundles(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.must_get_account(user_id)?;
        let mut bundles = self.list_bundles(user_id)?;

        // Availability already excludes expired bundles, so every row
        // written here snapshots the same post-sweep total.
        let available = compute_available(&account, &bundles, now);

        let mut batch = WriteBatch::default();
        let mut transactions = Vec::new();
        for bundle in &mut bundles {
            if !bundle.is_expired(now) || bundle.remaining == 0 {
                continue;
            }
            let lapsed = bundle.remaining;
            let tx = LedgerTransaction::expired(*user_id, lapsed, available, bundle.id, now);
            account.credits_balance -= lapsed;
            bundle.remaining = 0;
            self.stage_bundle(&mut batch, bundle)?;
            self.stage_transaction(&mut batch, &tx)?;
            transactions.push(tx);
        }

        if transactions.is_empty() {
            return Ok(transactions);
        }

        account.updated_at = now;
        self.stage_account(&mut batch, &account)?;
        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            lapsed_bundles = %transactions.len(),
            "expired bundle remainders settled"
        );
        Ok(transactions)
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    fn create_job(&self, job: &JobRecord) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_job(&mut batch, job)?;
        if let Some(package_id) = &job.package_id {
            let cf_by_package = self.cf(cf::JOBS_BY_PACKAGE)?;
            batch.put_cf(&cf_by_package, keys::package_job_key(package_id, &job.id), []);
        }
        self.write(batch)
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        let cf = self.cf(cf::JOBS)?;
        self.db
            .get_cf(&cf, keys::job_key(job_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_job_by_external(&self, external_job_id: &str) -> Result<Option<JobRecord>> {
        let cf = self.cf(cf::JOBS_BY_EXTERNAL)?;
        let Some(job_id_bytes) = self
            .db
            .get_cf(&cf, keys::external_job_key(external_job_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if job_id_bytes.len() != 16 {
            return Err(StoreError::Serialization(
                "malformed external job index entry".into(),
            ));
        }
        bytes.copy_from_slice(&job_id_bytes);
        self.get_job(&JobId::from_bytes(bytes))
    }

    fn list_jobs_by_package(&self, package_id: &PackageId) -> Result<Vec<JobRecord>> {
        let cf_by_package = self.cf(cf::JOBS_BY_PACKAGE)?;
        let prefix = keys::package_jobs_prefix(package_id);

        let mut jobs = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_package,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let job_id = keys::extract_job_id_from_package_key(&key);
            if let Some(job) = self.get_job(&job_id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn list_unresolved_jobs(&self, created_before: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let cf = self.cf(cf::JOBS)?;
        let mut jobs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let job: JobRecord = Self::deserialize(&value)?;
            if !job.is_terminal() && job.created_at < created_before {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn mark_job_dispatched(
        &self,
        job_id: &JobId,
        external_job_id: &str,
    ) -> Result<DispatchApplied> {
        let probe = self.must_get_job(job_id)?;
        let lock = self.user_lock(&probe.user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut job = self.must_get_job(job_id)?;
        if job.is_terminal() {
            // The timeout sweep got there first; the provider-side job is
            // orphaned and its ID is not recorded.
            return Ok(DispatchApplied::AlreadyTerminal(job));
        }

        job.status = JobStatus::Processing;
        job.external_job_id = Some(external_job_id.to_string());

        let mut batch = WriteBatch::default();
        self.stage_job(&mut batch, &job)?;
        let cf_external = self.cf(cf::JOBS_BY_EXTERNAL)?;
        batch.put_cf(
            &cf_external,
            keys::external_job_key(external_job_id),
            job.id.as_bytes(),
        );
        self.write(batch)?;

        Ok(DispatchApplied::Applied(job))
    }

    fn apply_job_terminal(
        &self,
        job_id: &JobId,
        outcome: &TerminalOutcome,
        now: DateTime<Utc>,
    ) -> Result<TerminalApplied> {
        let probe = self.must_get_job(job_id)?;
        let lock = self.user_lock(&probe.user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Compare-and-set: re-read under the lock, transition only if
        // still non-terminal.
        let mut job = self.must_get_job(job_id)?;
        if job.is_terminal() {
            return Ok(TerminalApplied::AlreadyTerminal(job));
        }

        job.status = outcome.status();
        job.completed_at = Some(now);
        match outcome {
            TerminalOutcome::Completed { result_refs } => {
                job.result_refs = result_refs.clone();
            }
            TerminalOutcome::Failed { error } => {
                job.error_message = Some(error.clone());
            }
        }

        let mut batch = WriteBatch::default();
        self.stage_job(&mut batch, &job)?;
        self.write(batch)?;

        Ok(TerminalApplied::Applied(job))
    }

    // =========================================================================
    // Package Operations
    // =========================================================================

    fn put_package(&self, package: &Package) -> Result<()> {
        let cf = self.cf(cf::PACKAGES)?;
        let value = Self::serialize(package)?;
        self.db
            .put_cf(&cf, keys::package_key(&package.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_package(&self, package_id: &PackageId) -> Result<Option<Package>> {
        let cf = self.cf(cf::PACKAGES)?;
        self.db
            .get_cf(&cf, keys::package_key(package_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_unsettled_packages(&self) -> Result<Vec<Package>> {
        let cf = self.cf(cf::PACKAGES)?;
        let mut packages = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let package: Package = Self::deserialize(&value)?;
            if !package.status.is_terminal() {
                packages.push(package);
            }
        }
        Ok(packages)
    }

    fn reconcile_package_write(
        &self,
        package_id: &PackageId,
        counts: &JobCounts,
        status: PackageStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>> {
        let lock = self.package_lock(package_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut package = self.get_package(package_id)?.ok_or(StoreError::NotFound {
            entity: "package",
            id: package_id.to_string(),
        })?;

        let changed = package.status != status
            || package.generated_count != counts.completed
            || package.failed_count != counts.failed;
        if !changed {
            return Ok(None);
        }

        package.status = status;
        package.generated_count = counts.completed;
        package.failed_count = counts.failed;
        if status.is_terminal() && package.completed_at.is_none() {
            package.completed_at = Some(now);
        }

        self.put_package(&package)?;
        Ok(Some(package))
    }
}
