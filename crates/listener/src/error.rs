use blockfeed_client::ClientError;
use blockfeed_codec::CodecError;
use blockfeed_keeper::KeeperError;
use blockfeed_publisher::PublishError;

/// An error raised by the listener pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// A chain node error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    /// A block keeper error.
    #[error("keeper error: {0}")]
    Keeper(#[from] KeeperError),
    /// A message encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A publishing error.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    /// A reorganization walked past the cached block window. Fatal for the
    /// session: the listener reconnects and gap-fills.
    #[error("reorg past the cached window at block {hash}")]
    ReorgTooDeep {
        /// The first ancestor hash that was no longer cached.
        hash: String,
    },
    /// The secondary node reports fresher heads than the subscription is
    /// delivering.
    #[error("sanity check failed: the primary node is stale")]
    SanityCheckFailed,
    /// A session task aborted.
    #[error("session task failed: {0}")]
    TaskFailed(String),
}

impl ListenerError {
    /// Returns true if the session should resubscribe rather than fail.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(err) => err.is_transient(),
            _ => false,
        }
    }
}
