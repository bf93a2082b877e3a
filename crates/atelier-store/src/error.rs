//! Error types for atelier storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record that was missing.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Account already exists.
    #[error("account already exists: {user_id}")]
    AccountExists {
        /// The user ID that already has an account.
        user_id: String,
    },

    /// Insufficient credits for a deduction. Guaranteed to leave balances
    /// unchanged.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits available at check time.
        available: i64,
        /// Credits the deduction required.
        required: i64,
    },

    /// An amount was zero or negative where a positive amount is required.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),
}
