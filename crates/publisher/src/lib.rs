//! Transport-agnostic publishing of encoded messages.
//!
//! The pipeline hands every encoded message to a [`Publisher`] together with
//! an optional attribute map; backends decide what to do with the
//! attributes. [`RedisStreamPublisher`] is the built-in backend; other
//! transports plug in behind the trait.

mod stream;
pub use stream::RedisStreamPublisher;

mod topic;
pub use topic::validate_topic_name;

use std::collections::HashMap;

/// An error raised while publishing a message.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// An error returned by the redis backend.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// The topic name is not acceptable to the transport.
    #[error("invalid topic name: {0}")]
    InvalidTopic(String),
    /// An error reported by a non-redis backend.
    #[error("publish failed: {0}")]
    Backend(String),
}

/// Message attributes delivered alongside the payload, for transports that
/// support them.
pub type Attributes = HashMap<String, String>;

/// A transport-agnostic sink for encoded messages.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync + std::fmt::Debug {
    /// Publishes `payload` to `topic`.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attrs: Option<Attributes>,
    ) -> Result<(), PublishError>;
}
