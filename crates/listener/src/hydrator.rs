use crate::{ListenerError, Retry};

use std::sync::Arc;

use blockfeed_client::{ChainNode, ClientError, FilterQuery};
use blockfeed_primitives::{Block, Header, Log};

/// The number of blocks fetched concurrently by range fetches.
pub(crate) const FETCH_BATCH_SIZE: usize = 32;

/// Log filter parameters passed through to the node, plus whether blocks are
/// hydrated with their transactions.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Contract addresses to filter logs by. Empty matches all.
    pub addresses: Vec<String>,
    /// Positional topic sets to filter logs by. Empty matches all.
    pub topics: Vec<Vec<String>>,
    /// Whether to also fetch the transactions of each block.
    pub with_transactions: bool,
}

/// Turns header references into fully materialized blocks.
///
/// Nodes announce heads before they finish indexing them, so fetches retry
/// on `NotFound` and "unknown block" responses with a fixed delay. An empty
/// log set gets one extra retry; some nodes return empty while indexing.
#[derive(Debug)]
pub struct Hydrator {
    node: Arc<dyn ChainNode>,
    options: FilterOptions,
    retry: Retry,
}

impl Hydrator {
    /// Returns a new hydrator over the given node.
    pub fn new(node: Arc<dyn ChainNode>, options: FilterOptions) -> Self {
        Self { node, options, retry: Retry::default() }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying node.
    pub fn node(&self) -> &Arc<dyn ChainNode> {
        &self.node
    }

    /// Hydrates a header into a block.
    pub async fn hydrate(&self, header: &Header) -> Result<Block, ListenerError> {
        tracing::debug!(target: "blockfeed::listener", hash = header.hash, "hydrating head");
        let logs = self.logs_by_block_hash(&header.hash).await?;
        let transactions = if self.options.with_transactions {
            let transactions = self
                .retry
                .retry("transactions_by_hash", ClientError::is_retryable_fetch, || {
                    self.node.transactions_by_hash(&header.hash)
                })
                .await?;
            Some(transactions)
        } else {
            None
        };
        Ok(Block::from_header(header, logs, transactions))
    }

    /// Fetches and hydrates the block with the given hash.
    pub async fn block_by_hash(&self, hash: &str) -> Result<Block, ListenerError> {
        let header = self
            .retry
            .retry("header_by_hash", ClientError::is_retryable_fetch, || {
                self.node.header_by_hash(hash)
            })
            .await?;
        self.hydrate(&header).await
    }

    /// Fetches and hydrates the block at the given height.
    pub async fn block_by_number(&self, number: u64) -> Result<Block, ListenerError> {
        let header = self
            .retry
            .retry("header_by_number", ClientError::is_retryable_fetch, || {
                self.node.header_by_number(Some(number))
            })
            .await?;
        self.hydrate(&header).await
    }

    /// Fetches and hydrates an inclusive block range, in parallel batches of
    /// [`FETCH_BATCH_SIZE`].
    pub async fn blocks_in_range(&self, from: u64, to: u64) -> Result<Vec<Block>, ListenerError> {
        let numbers: Vec<u64> = (from..=to).collect();
        let mut blocks = Vec::with_capacity(numbers.len());
        for batch in numbers.chunks(FETCH_BATCH_SIZE) {
            let fetched = futures::future::try_join_all(
                batch.iter().map(|number| self.block_by_number(*number)),
            )
            .await?;
            blocks.extend(fetched);
        }
        Ok(blocks)
    }

    async fn logs_by_block_hash(&self, hash: &str) -> Result<Vec<Log>, ListenerError> {
        let query = FilterQuery {
            block_hash: Some(hash.to_string()),
            addresses: self.options.addresses.clone(),
            topics: self.options.topics.clone(),
            ..Default::default()
        };

        let mut attempt = 0;
        let mut retried_empty = false;
        loop {
            match self.node.filter_logs(query.clone()).await {
                Ok(logs) if logs.is_empty() && !retried_empty => {
                    retried_empty = true;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Ok(logs) => return Ok(logs),
                Err(err) if err.is_retryable_fetch() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        target: "blockfeed::listener",
                        hash,
                        %err,
                        attempt,
                        "retrying log fetch"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chain, log_for, node::MockChainNode};
    use std::time::Duration;

    fn fast_retry() -> Retry {
        Retry::new(5, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_hydrate_retries_unindexed_block() {
        let node = MockChainNode::new();
        let headers = chain(3);
        node.add_chain(&headers);
        let head = headers.last().unwrap();
        node.set_logs(&head.hash, vec![log_for(head)]);
        node.fail_logs(&head.hash, 2);

        let hydrator =
            Hydrator::new(Arc::new(node), FilterOptions::default()).with_retry(fast_retry());
        let block = hydrator.hydrate(head).await.unwrap();
        assert_eq!(block.hash, head.hash);
        assert_eq!(block.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_gives_up_after_retries() {
        let node = MockChainNode::new();
        let headers = chain(2);
        node.add_chain(&headers);
        let head = headers.last().unwrap();
        node.fail_logs(&head.hash, 100);

        let hydrator = Hydrator::new(Arc::new(node), FilterOptions::default())
            .with_retry(Retry::new(2, Duration::from_millis(5)));
        assert!(hydrator.hydrate(head).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_log_set_is_retried_once() {
        let node = MockChainNode::new();
        let headers = chain(2);
        node.add_chain(&headers);
        let head = headers.last().unwrap().clone();

        let hydrator =
            Hydrator::new(Arc::new(node), FilterOptions::default()).with_retry(fast_retry());
        // No logs registered for the block: the hydrator retries once and
        // then accepts the empty set.
        let block = hydrator.hydrate(&head).await.unwrap();
        assert!(block.logs.is_empty());
    }

    #[tokio::test]
    async fn test_blocks_in_range_orders_by_number() {
        let node = MockChainNode::new();
        let headers = chain(40);
        node.add_chain(&headers);
        for header in &headers {
            node.set_logs(&header.hash, vec![log_for(header)]);
        }

        let hydrator =
            Hydrator::new(Arc::new(node), FilterOptions::default()).with_retry(fast_retry());
        let blocks = hydrator.blocks_in_range(3, 39).await.unwrap();
        let numbers: Vec<u64> = blocks.iter().map(|block| block.number).collect();
        assert_eq!(numbers, (3..=39).collect::<Vec<u64>>());
    }
}
