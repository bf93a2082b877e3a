//! Core types for the atelier credits service.
//!
//! This crate provides the foundational types shared by the storage and
//! engine layers:
//!
//! - **Identifiers**: `UserId`, `JobId`, `PackageId`, `BundleId`,
//!   `TransactionId`
//! - **Accounts**: `CreditAccount` and the availability math (cycle
//!   allotment, renewal grace, purchased pool)
//! - **Bundles**: `Bundle` purchased credit batches with expiry
//! - **Ledger**: `LedgerTransaction`, `TransactionKind`, typed
//!   `TransactionMetadata`
//! - **Jobs**: `JobRecord` and its terminal-state machine
//! - **Packages**: `Package` and the pure status derivation
//!
//! # Credit Unit
//!
//! **1 credit buys 1 unit of generation work.** Costs and balances are
//! stored as `i64` whole credits; there are no fractional credits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod bundle;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod package;

pub use account::{compute_available, CreditAccount, RENEWAL_GRACE_HOURS};
pub use bundle::Bundle;
pub use ids::{BundleId, IdError, JobId, PackageId, TransactionId, UserId};
pub use job::{JobRecord, JobStatus, TerminalOutcome, TerminalSource};
pub use ledger::{
    CreditOp, LedgerTransaction, TransactionFilter, TransactionKind, TransactionMetadata,
    TransactionSource,
};
pub use package::{derive_status, JobCounts, Package, PackageStatus, PACKAGE_GRACE_SECS};
