use blockfeed_store::StoreError;

/// An error returned by the block keeper.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// The block is already in the keeper.
    #[error("block {0}: already exists")]
    AlreadyExists(String),
    /// The block is neither in memory nor in the store.
    #[error("block {0}: not found")]
    NotFound(String),
    /// The caller passed an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A persisted value could not be decoded.
    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] serde_json::Error),
}
