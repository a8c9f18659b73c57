use crate::{Attributes, PublishError, Publisher};

use redis::{aio::ConnectionManager, streams::StreamMaxlen};

/// The stream field holding the encoded message.
const MESSAGE_KEY: &str = "message";

/// A [`Publisher`] appending messages to a redis stream with `XADD`,
/// trimming the stream to approximately `max_len` entries.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    connection: ConnectionManager,
    max_len: usize,
}

impl std::fmt::Debug for RedisStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamPublisher").field("max_len", &self.max_len).finish()
    }
}

impl RedisStreamPublisher {
    /// Returns a new publisher over an established connection.
    pub fn new(connection: ConnectionManager, max_len: usize) -> Self {
        Self { connection, max_len }
    }
}

#[async_trait::async_trait]
impl Publisher for RedisStreamPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attrs: Option<Attributes>,
    ) -> Result<(), PublishError> {
        let mut fields: Vec<(String, Vec<u8>)> = vec![(MESSAGE_KEY.to_string(), payload)];
        if let Some(attrs) = attrs {
            fields.extend(attrs.into_iter().map(|(key, value)| (key, value.into_bytes())));
        }

        let mut connection = self.connection.clone();
        let id: String = redis::AsyncCommands::xadd_maxlen(
            &mut connection,
            topic,
            StreamMaxlen::Approx(self.max_len),
            "*",
            &fields,
        )
        .await?;
        tracing::trace!(target: "blockfeed::publisher", topic, id, "appended message to stream");

        Ok(())
    }
}
