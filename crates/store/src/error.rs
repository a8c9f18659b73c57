/// An error that occurred while talking to the key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An error returned by the redis backend.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// The configured store address could not be parsed.
    #[error("invalid store address: {0}")]
    InvalidAddress(String),
    /// An error reported by a non-redis backend.
    #[error("store backend error: {0}")]
    Backend(String),
}
