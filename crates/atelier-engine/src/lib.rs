//! Orchestration layer for atelier: credit management, job lifecycle, and
//! package reconciliation.
//!
//! The engine owns the write paths with correctness requirements:
//!
//! - [`CreditManager`] is the single writer for accounts and the ledger.
//! - [`JobLifecycle`] funnels every terminal trigger (push callback,
//!   recovery poll, timeout sweep, submission failure) through one
//!   compare-and-set entry point, so side effects fire exactly once.
//! - [`Reconciler`] is the single writer for package status, recomputing
//!   it from the live job records on every pass.
//! - [`sweeps`] runs the stateless background ticks that replace
//!   per-process poll timers: everything they need is re-read from the
//!   durable tables each tick.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credits;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod provider;
pub mod reconcile;
pub mod sweeps;

pub use credits::{Availability, CreditManager};
pub use error::{EngineError, Result};
pub use lifecycle::{JobLifecycle, SubmitRequest};
pub use notify::{LogNotifier, Notifier, PackageStatusChange};
pub use provider::{
    CallbackPayload, CallbackStatus, ComputeProvider, GenerationRequest, HttpComputeProvider,
    MediaKind, ProviderError,
};
pub use reconcile::Reconciler;
pub use sweeps::{spawn_sweeps, SweepConfig};
