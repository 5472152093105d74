/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Failures inside the cache layer. None of these escape `CacheStore`;
/// callers only ever see a miss or a `false` write.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend {op} failed: {message}")]
    Backend { op: &'static str, message: String },

    #[error("Malformed cache record: {0}")]
    Malformed(String),

    #[error("Cache payload (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(op: &'static str, e: impl std::fmt::Display) -> Self {
        CacheError::Backend {
            op,
            message: e.to_string(),
        }
    }
}
