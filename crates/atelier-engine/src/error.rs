//! Error types for the engine.

use atelier_core::JobId;
use atelier_store::StoreError;

use crate::provider::ProviderError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Storage layer failure (including `InsufficientCredits`).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Compute provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Job creation failed at the provider before an external job ID
    /// existed. The job is already marked failed and refunded.
    #[error("submission failed for job {job_id}: {message}")]
    Submission {
        /// The job that was marked failed.
        job_id: JobId,
        /// Provider error detail.
        message: String,
    },

    /// A callback or poll referenced an external job ID we never recorded.
    #[error("unknown external job: {external_job_id}")]
    UnknownExternalJob {
        /// The provider-side job ID.
        external_job_id: String,
    },
}
