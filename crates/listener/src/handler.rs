use crate::{
    find_reorg_blocks, Hydrator, ListenerError, ListenerMetrics, LiveChainWalker,
    StoredChainWalker,
};

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use blockfeed_codec::Encoder;
use blockfeed_keeper::{BlockKeeper, KeeperError};
use blockfeed_primitives::{Block, Message};
use blockfeed_publisher::{Attributes, Publisher};

/// Reorganizations at least this deep are logged at warn.
const DEEP_REORG_WARNING_DEPTH: usize = 3;

/// Applies the reorg resolver to every dispatched block, publishes the
/// resulting message and commits the new blocks to the keeper.
///
/// Publication precedes commit: a failed publish leaves the keeper
/// untouched, so a later retry re-emits the block. At-least-once with
/// possible duplicates is preferred over silent loss.
#[derive(Debug)]
pub struct Handler {
    topic: String,
    keeper: Arc<BlockKeeper>,
    hydrator: Arc<Hydrator>,
    publisher: Arc<dyn Publisher>,
    encoder: Encoder,
    slow_block_threshold: Option<Duration>,
    metrics: ListenerMetrics,
}

impl Handler {
    /// Returns a new handler publishing to `topic`.
    pub fn new(
        topic: impl Into<String>,
        keeper: Arc<BlockKeeper>,
        hydrator: Arc<Hydrator>,
        publisher: Arc<dyn Publisher>,
        encoder: Encoder,
    ) -> Self {
        Self {
            topic: topic.into(),
            keeper,
            hydrator,
            publisher,
            encoder,
            slow_block_threshold: None,
            metrics: ListenerMetrics::default(),
        }
    }

    /// Warn when a handled block's timestamp lags wall clock by more than
    /// `threshold`.
    pub fn with_slow_block_threshold(mut self, threshold: Duration) -> Self {
        self.slow_block_threshold = Some(threshold);
        self
    }

    /// Initializes the keeper: restore from the store, and when that leaves
    /// it empty, back-fill the most recent window from the node.
    pub async fn init(&self) -> Result<(), ListenerError> {
        tracing::info!(target: "blockfeed::listener", "initializing block keeper");
        self.keeper.init().await?;
        if !self.keeper.is_empty() {
            return Ok(());
        }

        let to_block = self.hydrator.node().block_number().await?;
        let from_block = to_block.saturating_sub(self.keeper.capacity() as u64 - 1);
        tracing::info!(
            target: "blockfeed::listener",
            from = from_block,
            to = to_block,
            "back-filling recent blocks from node"
        );

        let blocks = self.hydrator.blocks_in_range(from_block, to_block).await?;
        for block in blocks {
            self.keeper.add(block).await?;
        }
        Ok(())
    }

    /// Handles one dispatched block.
    pub async fn handle(&self, block: Block) -> Result<(), ListenerError> {
        if self.keeper.exists(&block.hash) {
            tracing::debug!(
                target: "blockfeed::listener",
                hash = block.hash,
                "ignoring already handled block"
            );
            return Ok(());
        }

        if let Ok(head) = self.keeper.head() {
            let distance = head.number.abs_diff(block.number);
            if distance > self.keeper.capacity() as u64 {
                tracing::warn!(
                    target: "blockfeed::listener",
                    number = block.number,
                    head = head.number,
                    distance,
                    "ignoring block outside the cached window"
                );
                self.metrics.dropped_blocks.increment(1);
                return Ok(());
            }
        }

        self.warn_if_slow(&block);

        let (reverted_blocks, new_blocks) = if self.keeper.is_reorg(&block) {
            let head = self.keeper.head()?;
            tracing::info!(
                target: "blockfeed::listener",
                head = head.hash,
                incoming = block.hash,
                "resolving reorganized head"
            );
            let stored = StoredChainWalker::new(self.keeper.clone());
            let live = LiveChainWalker::new(self.keeper.clone(), self.hydrator.clone());
            let (reverted, new_chain) = find_reorg_blocks(head, block, &stored, &live).await?;

            self.metrics.reorgs.increment(1);
            self.metrics.reorg_depths.record(reverted.len() as f64);
            if reverted.len() >= DEEP_REORG_WARNING_DEPTH {
                tracing::warn!(
                    target: "blockfeed::listener",
                    depth = reverted.len(),
                    "deep reorganization"
                );
            }
            (reverted, new_chain)
        } else {
            (Vec::new(), vec![block])
        };

        let message = Message { reverted_blocks, new_blocks };
        tracing::info!(
            target: "blockfeed::listener",
            topic = self.topic,
            reverted = message.reverted_blocks.len(),
            new = message.new_blocks.len(),
            "publishing message"
        );

        let payload = self.encoder.encode(&message)?;
        let attrs = message.new_blocks.last().map(block_attributes);
        self.publisher.publish(&self.topic, payload, attrs).await?;
        self.metrics.published_messages.increment(1);

        for block in message.new_blocks {
            match self.keeper.add(block).await {
                Ok(()) | Err(KeeperError::AlreadyExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.metrics.handled_blocks.increment(1);
        Ok(())
    }

    fn warn_if_slow(&self, block: &Block) {
        let Some(threshold) = self.slow_block_threshold else {
            return;
        };
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let lag = now.saturating_sub(block.timestamp);
        if lag > threshold.as_secs() {
            tracing::warn!(
                target: "blockfeed::listener",
                number = block.number,
                lag_secs = lag,
                threshold_secs = threshold.as_secs(),
                "handling a slow block"
            );
        }
    }
}

fn block_attributes(block: &Block) -> Attributes {
    Attributes::from([
        ("block_number".to_string(), block.number.to_string()),
        ("block_hash".to_string(), block.hash.clone()),
        ("parent_hash".to_string(), block.parent_hash.clone()),
        ("block_timestamp".to_string(), block.timestamp.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{block_for, chain, chain_from, log_for, node::MockChainNode, RecordingPublisher},
        FilterOptions, Retry,
    };
    use blockfeed_store::MemoryStore;

    const TTL: Duration = Duration::from_secs(60 * 60);

    struct Fixture {
        handler: Handler,
        keeper: Arc<BlockKeeper>,
        node: Arc<MockChainNode>,
        publisher: Arc<RecordingPublisher>,
    }

    async fn fixture(capacity: usize, stored: &[blockfeed_primitives::Header]) -> Fixture {
        let keeper = Arc::new(BlockKeeper::new(capacity, TTL, Arc::new(MemoryStore::new())));
        for header in stored {
            keeper.add(block_for(header)).await.unwrap();
        }
        let node = Arc::new(MockChainNode::new());
        let hydrator = Arc::new(
            Hydrator::new(node.clone(), FilterOptions::default())
                .with_retry(Retry::new(1, Duration::from_millis(2))),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let handler = Handler::new(
            "blocks",
            keeper.clone(),
            hydrator,
            publisher.clone(),
            Encoder::Json,
        );
        Fixture { handler, keeper, node, publisher }
    }

    #[tokio::test]
    async fn test_linear_extension() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;

        let next = chain_from(headers.last().unwrap(), 1).remove(0);
        fixture.handler.handle(block_for(&next)).await.unwrap();

        let messages = fixture.publisher.messages(Encoder::Json);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].reverted_blocks.is_empty());
        assert_eq!(messages[0].new_blocks.len(), 1);
        assert_eq!(messages[0].new_blocks[0].hash, next.hash);
        assert_eq!(fixture.keeper.head().unwrap().hash, next.hash);
    }

    #[tokio::test]
    async fn test_single_block_reorg_publishes_revert() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;

        let sibling = chain_from(&headers[1], 1).remove(0);
        fixture.handler.handle(block_for(&sibling)).await.unwrap();

        let messages = fixture.publisher.messages(Encoder::Json);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].reverted_blocks.len(), 1);
        assert_eq!(messages[0].reverted_blocks[0].hash, headers[2].hash);
        assert_eq!(messages[0].new_blocks.len(), 1);
        assert_eq!(messages[0].new_blocks[0].hash, sibling.hash);
        assert_eq!(fixture.keeper.head().unwrap().hash, sibling.hash);
    }

    #[tokio::test]
    async fn test_duplicate_block_is_dropped() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;

        fixture.handler.handle(block_for(&headers[2])).await.unwrap();
        assert!(fixture.publisher.messages(Encoder::Json).is_empty());
        assert_eq!(fixture.keeper.len(), 3);
    }

    #[tokio::test]
    async fn test_block_outside_window_is_dropped() {
        let headers = chain(3);
        let fixture = fixture(4, &headers).await;

        let stale = Block { number: 100, hash: "0xffff".into(), ..Default::default() };
        fixture.handler.handle(stale).await.unwrap();
        assert!(fixture.publisher.messages(Encoder::Json).is_empty());
        assert_eq!(fixture.keeper.head().unwrap().hash, headers[2].hash);
    }

    #[tokio::test]
    async fn test_publish_failure_commits_nothing() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;
        fixture.publisher.fail_times(1);

        let next = chain_from(headers.last().unwrap(), 1).remove(0);
        let err = fixture.handler.handle(block_for(&next)).await.unwrap_err();
        assert!(matches!(err, ListenerError::Publish(_)));
        assert!(!fixture.keeper.exists(&next.hash));
        assert_eq!(fixture.keeper.head().unwrap().hash, headers[2].hash);

        // The retried block publishes and commits.
        fixture.handler.handle(block_for(&next)).await.unwrap();
        assert_eq!(fixture.keeper.head().unwrap().hash, next.hash);
    }

    #[tokio::test]
    async fn test_init_backfills_empty_keeper() {
        let keeper = Arc::new(BlockKeeper::new(4, TTL, Arc::new(MemoryStore::new())));
        let node = Arc::new(MockChainNode::new());
        let headers = chain(10);
        node.add_chain(&headers);
        for header in &headers {
            node.set_logs(&header.hash, vec![log_for(header)]);
        }

        let hydrator = Arc::new(
            Hydrator::new(node.clone(), FilterOptions::default())
                .with_retry(Retry::new(1, Duration::from_millis(2))),
        );
        let publisher = Arc::new(RecordingPublisher::new());
        let handler =
            Handler::new("blocks", keeper.clone(), hydrator, publisher.clone(), Encoder::Json);

        handler.init().await.unwrap();
        assert_eq!(keeper.len(), 4);
        assert_eq!(keeper.head().unwrap().number, 10);
        // Back-fill does not publish.
        assert!(publisher.messages(Encoder::Json).is_empty());
    }
}
