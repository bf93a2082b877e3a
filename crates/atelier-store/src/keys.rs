//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families. UUID-based IDs encode as their 16 raw bytes; ledger
//! transaction IDs are ULIDs, so composite `user || transaction` keys sort
//! chronologically within a user's prefix.

use atelier_core::{BundleId, JobId, PackageId, TransactionId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a bundle key.
///
/// Format: `user_id (16 bytes) || bundle_id (16 bytes)`
#[must_use]
pub fn bundle_key(user_id: &UserId, bundle_id: &BundleId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(bundle_id.as_bytes());
    key
}

/// Create a prefix for iterating all bundles for a user.
#[must_use]
pub fn user_bundles_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user sort by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a job key from a job ID.
#[must_use]
pub fn job_key(job_id: &JobId) -> Vec<u8> {
    job_id.as_bytes().to_vec()
}

/// Create an external-job index key from the provider's job ID.
#[must_use]
pub fn external_job_key(external_job_id: &str) -> Vec<u8> {
    external_job_id.as_bytes().to_vec()
}

/// Create a package-job index key.
///
/// Format: `package_id (16 bytes) || job_id (16 bytes)`
#[must_use]
pub fn package_job_key(package_id: &PackageId, job_id: &JobId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(package_id.as_bytes());
    key.extend_from_slice(job_id.as_bytes());
    key
}

/// Create a prefix for iterating all jobs linked to a package.
#[must_use]
pub fn package_jobs_prefix(package_id: &PackageId) -> Vec<u8> {
    package_id.as_bytes().to_vec()
}

/// Extract the job ID from a package-job index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_job_id_from_package_key(key: &[u8]) -> JobId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    JobId::from_bytes(bytes)
}

/// Create a package key from a package ID.
#[must_use]
pub fn package_key(package_id: &PackageId) -> Vec<u8> {
    package_id.as_bytes().to_vec()
}
