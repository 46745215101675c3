use thiserror::Error;

/// Result type for anomaly store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Anomaly store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Anomaly is absent or its TTL window has lapsed.
    #[error("anomaly not found: {0}")]
    NotFound(String),

    /// An explicit variant was requested that the anomaly does not carry.
    #[error("anomaly {anomaly_id} has no variant {variant_id}")]
    InvalidVariantSelection {
        anomaly_id: String,
        variant_id: String,
    },

    /// The backing store could not be reached or is in an unusable state.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// True for every outcome a caller should report as "not found".
    ///
    /// An unknown explicit variant leaves the anomaly untouched and is
    /// reported the same way as a missing anomaly.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::InvalidVariantSelection { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
