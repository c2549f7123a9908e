//! Error types for call ingestion and querying.

/// Failures raised by a [`CallStore`](crate::CallStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored payload could not be encoded or decoded.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp or day bucket could not be parsed.
    #[error("malformed stored timestamp: {0}")]
    Timestamp(String),
}

/// Errors surfaced by the ingestion and query services.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Organisation or repository is empty.
    #[error("please specify organisation and repository")]
    MissingScope,

    /// The request body is not valid JSON or not a JSON object.
    #[error("'{raw}' is {reason}")]
    InvalidPayload {
        /// The offending body, lossily decoded as UTF-8.
        raw: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The `group_by` value is neither empty nor `day`.
    #[error("group_by key '{0}' not supported")]
    UnsupportedGroupBy(String),

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CallError {
    /// Returns `true` when the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
