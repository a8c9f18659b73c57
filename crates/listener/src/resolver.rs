use crate::{Hydrator, ListenerError};

use std::sync::Arc;

use blockfeed_keeper::{BlockKeeper, KeeperError};
use blockfeed_primitives::Block;

/// A backward view over one chain: given a block, produce its parent.
#[async_trait::async_trait]
pub trait ChainWalker: Send + Sync {
    /// Returns the parent of `block`.
    async fn parent_of(&self, block: &Block) -> Result<Block, ListenerError>;
}

/// Walks the locally stored chain through the keeper. Walking past the
/// cached window fails with [`ListenerError::ReorgTooDeep`].
#[derive(Debug)]
pub struct StoredChainWalker {
    keeper: Arc<BlockKeeper>,
}

impl StoredChainWalker {
    /// Returns a walker over the keeper's chain.
    pub fn new(keeper: Arc<BlockKeeper>) -> Self {
        Self { keeper }
    }
}

#[async_trait::async_trait]
impl ChainWalker for StoredChainWalker {
    async fn parent_of(&self, block: &Block) -> Result<Block, ListenerError> {
        match self.keeper.get(&block.parent_hash).await {
            Ok(parent) => Ok(parent),
            Err(KeeperError::NotFound(hash)) => Err(ListenerError::ReorgTooDeep { hash }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Walks the live chain: keeper first, then the node through the hydrator.
#[derive(Debug)]
pub struct LiveChainWalker {
    keeper: Arc<BlockKeeper>,
    hydrator: Arc<Hydrator>,
}

impl LiveChainWalker {
    /// Returns a walker over the node's chain.
    pub fn new(keeper: Arc<BlockKeeper>, hydrator: Arc<Hydrator>) -> Self {
        Self { keeper, hydrator }
    }
}

#[async_trait::async_trait]
impl ChainWalker for LiveChainWalker {
    async fn parent_of(&self, block: &Block) -> Result<Block, ListenerError> {
        match self.keeper.get(&block.parent_hash).await {
            Ok(parent) => Ok(parent),
            Err(KeeperError::NotFound(_)) => self.hydrator.block_by_hash(&block.parent_hash).await,
            Err(err) => Err(err.into()),
        }
    }
}

/// Finds the blocks affected by a reorganization with a two-pointer backward
/// walk from `stored` (the local tip) and `incoming` (the new head whose
/// parent is not the tip).
///
/// Returns the reverted blocks ordered tip to ancestor and the new blocks
/// ordered ancestor to tip. The common ancestor appears in neither list.
pub async fn find_reorg_blocks(
    stored: Block,
    incoming: Block,
    stored_chain: &dyn ChainWalker,
    live_chain: &dyn ChainWalker,
) -> Result<(Vec<Block>, Vec<Block>), ListenerError> {
    tracing::debug!(
        target: "blockfeed::listener",
        stored_hash = stored.hash,
        stored_number = stored.number,
        incoming_hash = incoming.hash,
        incoming_number = incoming.number,
        "resolving reorganization"
    );

    let mut reverted = Vec::new();
    let mut new_chain = Vec::new();
    let (mut stored, mut incoming) = (stored, incoming);

    while stored.hash != incoming.hash {
        if stored.number >= incoming.number {
            let parent = stored_chain.parent_of(&stored).await?;
            reverted.push(std::mem::replace(&mut stored, parent));
        }
        if incoming.number > stored.number {
            let parent = live_chain.parent_of(&incoming).await?;
            new_chain.push(std::mem::replace(&mut incoming, parent));
        }
    }

    new_chain.reverse();
    Ok((reverted, new_chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{block_for, chain, chain_from, log_for, node::MockChainNode},
        FilterOptions, Retry,
    };
    use blockfeed_primitives::Header;
    use blockfeed_store::MemoryStore;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60 * 60);

    struct Fixture {
        keeper: Arc<BlockKeeper>,
        node: Arc<MockChainNode>,
        stored: StoredChainWalker,
        live: LiveChainWalker,
    }

    async fn fixture(capacity: usize, stored_chain: &[Header]) -> Fixture {
        let keeper = Arc::new(BlockKeeper::new(capacity, TTL, Arc::new(MemoryStore::new())));
        for header in stored_chain {
            keeper.add(block_for(header)).await.unwrap();
        }
        let node = Arc::new(MockChainNode::new());
        let hydrator = Arc::new(
            Hydrator::new(node.clone(), FilterOptions::default())
                .with_retry(Retry::new(1, Duration::from_millis(2))),
        );
        Fixture {
            keeper: keeper.clone(),
            node,
            stored: StoredChainWalker::new(keeper.clone()),
            live: LiveChainWalker::new(keeper, hydrator),
        }
    }

    #[tokio::test]
    async fn test_single_block_reorg() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;

        // A sibling of the tip, extending the tip's parent.
        let sibling = chain_from(&headers[1], 1).remove(0);

        let (reverted, new_chain) = find_reorg_blocks(
            fixture.keeper.head().unwrap(),
            block_for(&sibling),
            &fixture.stored,
            &fixture.live,
        )
        .await
        .unwrap();

        assert_eq!(reverted.iter().map(|b| &b.hash).collect::<Vec<_>>(), vec![&headers[2].hash]);
        assert_eq!(new_chain.iter().map(|b| &b.hash).collect::<Vec<_>>(), vec![&sibling.hash]);
        // The fork shares the parent of the reverted tip.
        assert_eq!(reverted.last().unwrap().parent_hash, new_chain[0].parent_hash);
    }

    #[tokio::test]
    async fn test_two_deep_reorg_fetches_fork_from_node() {
        let headers = chain(3);
        let fixture = fixture(8, &headers).await;

        // A fork of length two rooted at block 1: the fork parent is only
        // known to the node.
        let fork = chain_from(&headers[0], 2);
        fixture.node.add_chain(&fork);
        for header in &fork {
            fixture.node.set_logs(&header.hash, vec![log_for(header)]);
        }

        let incoming = block_for(&fork[1]);
        let (reverted, new_chain) = find_reorg_blocks(
            fixture.keeper.head().unwrap(),
            incoming,
            &fixture.stored,
            &fixture.live,
        )
        .await
        .unwrap();

        // Stored blocks come back tip first, the fork ancestor to tip.
        assert_eq!(
            reverted.iter().map(|b| &b.hash).collect::<Vec<_>>(),
            vec![&headers[2].hash, &headers[1].hash]
        );
        assert_eq!(
            new_chain.iter().map(|b| &b.hash).collect::<Vec<_>>(),
            vec![&fork[0].hash, &fork[1].hash]
        );
        assert_eq!(reverted.last().unwrap().parent_hash, new_chain[0].parent_hash);
    }

    #[tokio::test]
    async fn test_gap_and_reorg_walks_new_chain_down() {
        // Stored chain up to block 5; the incoming head is at 10 on a fork
        // rooted at block 4.
        let headers = chain(5);
        let fixture = fixture(16, &headers).await;

        let fork = chain_from(&headers[3], 6);
        fixture.node.add_chain(&fork);
        for header in &fork {
            fixture.node.set_logs(&header.hash, vec![log_for(header)]);
        }

        let incoming = block_for(fork.last().unwrap());
        let (reverted, new_chain) = find_reorg_blocks(
            fixture.keeper.head().unwrap(),
            incoming,
            &fixture.stored,
            &fixture.live,
        )
        .await
        .unwrap();

        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].hash, headers[4].hash);
        assert_eq!(new_chain.len(), 6);
        assert_eq!(new_chain[0].hash, fork[0].hash);
        assert_eq!(new_chain.last().unwrap().hash, fork[5].hash);
    }

    #[tokio::test]
    async fn test_walk_past_window_is_too_deep() {
        let headers = chain(6);
        let fixture = fixture(6, &headers).await;

        // A disjoint chain sharing no ancestor inside the stored window: the
        // stored walk runs off the end of the keeper.
        let fork = chain(7);
        fixture.node.add_chain(&fork);
        for header in &fork {
            fixture.node.set_logs(&header.hash, vec![log_for(header)]);
        }

        let incoming = block_for(fork.last().unwrap());
        let result = find_reorg_blocks(
            fixture.keeper.head().unwrap(),
            incoming,
            &fixture.stored,
            &fixture.live,
        )
        .await;

        assert!(matches!(result, Err(ListenerError::ReorgTooDeep { .. })));
    }
}
