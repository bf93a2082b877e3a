//! HTTP API service for atelier.
//!
//! Exposes the credit economy and job reconciliation engine over HTTP:
//! account and balance reads, credit grants, job submission, package
//! status, and the provider callback webhook. Background sweeps are
//! spawned by the binary, not by the router, so tests can drive ticks
//! deterministically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
