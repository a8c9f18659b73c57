//! Bounded, parent-linked cache of recent blocks with a durable shadow.
//!
//! The keeper holds the last `capacity` blocks in memory (a hash map plus a
//! FIFO of insertion order) and writes every accepted block through to a
//! [`KeyValueStore`] so the window survives restarts. The store is a
//! superset of memory: anything in memory is also persisted (TTL permitting)
//! but not the other way around.

mod error;
pub use error::KeeperError;

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use blockfeed_primitives::Block;
use blockfeed_store::KeyValueStore;
use parking_lot::RwLock;

/// The store key holding the hash of the current tip. Persisted without a
/// TTL: the head pointer must outlive any single block.
const BLOCK_HEAD_KEY: &str = "block-head";

/// The floor for a persisted block's TTL, so blocks older than the retention
/// window still get a short one.
const MIN_BLOCK_TTL: Duration = Duration::from_secs(60);

/// A bounded cache of the most recent blocks, keyed by hash and linked by
/// `parent_hash`, with a write-through durable shadow.
#[derive(Debug)]
pub struct BlockKeeper {
    capacity: usize,
    ttl: Duration,
    store: Arc<dyn KeyValueStore>,
    inner: RwLock<KeeperInner>,
}

#[derive(Debug, Default)]
struct KeeperInner {
    head: Option<String>,
    map: HashMap<String, Block>,
    fifo: VecDeque<String>,
}

impl KeeperInner {
    /// Inserts a block into memory, evicting the oldest insertion when full.
    fn insert(&mut self, capacity: usize, block: Block) {
        if self.fifo.len() == capacity {
            if let Some(oldest) = self.fifo.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.head = Some(block.hash.clone());
        self.fifo.push_back(block.hash.clone());
        self.map.insert(block.hash.clone(), block);
    }

    fn clear(&mut self) {
        self.head = None;
        self.map.clear();
        self.fifo.clear();
    }
}

impl BlockKeeper {
    /// Returns a new keeper.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, ttl: Duration, store: Arc<dyn KeyValueStore>) -> Self {
        assert!(capacity > 0, "keeper capacity must be positive");
        Self { capacity, ttl, store, inner: RwLock::new(KeeperInner::default()) }
    }

    /// Restores the in-memory window from the store.
    ///
    /// Reads the persisted head pointer and walks the parent chain for up to
    /// `capacity` blocks, then replays the walk ancestor to tip. An absent
    /// head pointer yields an empty keeper; a missing intermediate block
    /// truncates the restored window. Store failures are fatal.
    pub async fn init(&self) -> Result<(), KeeperError> {
        let Some(encoded) = self.store.get(BLOCK_HEAD_KEY).await? else {
            self.inner.write().clear();
            return Ok(());
        };
        let mut hash: String = serde_json::from_slice(&encoded)?;

        let mut blocks = Vec::with_capacity(self.capacity);
        for _ in 0..self.capacity {
            let Some(encoded) = self.store.get(&hash).await? else {
                break;
            };
            let block: Block = serde_json::from_slice(&encoded)?;
            hash = block.parent_hash.clone();
            blocks.push(block);
        }

        tracing::info!(
            target: "blockfeed::keeper",
            restored = blocks.len(),
            "restored recent blocks from store"
        );

        let mut inner = self.inner.write();
        inner.clear();
        for block in blocks.into_iter().rev() {
            inner.insert(self.capacity, block);
        }
        Ok(())
    }

    /// Adds a block to the keeper, persisting it before memory is mutated so
    /// memory never leads the durable state.
    ///
    /// The block's `reorged_hash` is stamped here: the previous tip if the
    /// block does not extend it, `None` otherwise.
    pub async fn add(&self, mut block: Block) -> Result<(), KeeperError> {
        {
            let inner = self.inner.read();
            if inner.map.contains_key(&block.hash) {
                return Err(KeeperError::AlreadyExists(block.hash));
            }
            block.reorged_hash = match &inner.head {
                Some(head) if *head != block.parent_hash => Some(head.clone()),
                _ => None,
            };
        }

        let encoded = serde_json::to_vec(&block)?;
        self.store.set(&block.hash, encoded, Some(self.block_ttl(block.timestamp))).await?;
        let head = serde_json::to_vec(&block.hash)?;
        self.store.set(BLOCK_HEAD_KEY, head, None).await?;

        let mut inner = self.inner.write();
        if inner.map.contains_key(&block.hash) {
            return Err(KeeperError::AlreadyExists(block.hash));
        }
        inner.insert(self.capacity, block);
        Ok(())
    }

    /// Returns the block with the given hash, falling through to the store
    /// on a memory miss.
    pub async fn get(&self, hash: &str) -> Result<Block, KeeperError> {
        if let Some(block) = self.inner.read().map.get(hash) {
            return Ok(block.clone());
        }

        tracing::debug!(target: "blockfeed::keeper", hash, "looking up block in store");
        match self.store.get(hash).await? {
            Some(encoded) => Ok(serde_json::from_slice(&encoded)?),
            None => Err(KeeperError::NotFound(hash.to_string())),
        }
    }

    /// Returns true if the hash is in the in-memory window. Cheap path used
    /// for duplicate suppression; the store is not consulted.
    pub fn exists(&self, hash: &str) -> bool {
        self.inner.read().map.contains_key(hash)
    }

    /// Returns the current tip block.
    pub fn head(&self) -> Result<Block, KeeperError> {
        let inner = self.inner.read();
        let hash = inner.head.as_ref().ok_or_else(|| KeeperError::NotFound("head".into()))?;
        inner.map.get(hash).cloned().ok_or_else(|| KeeperError::NotFound(hash.clone()))
    }

    /// Returns true if accepting `block` would reorganize the chain: the
    /// keeper is non-empty and the block does not extend the tip.
    pub fn is_reorg(&self, block: &Block) -> bool {
        let inner = self.inner.read();
        match &inner.head {
            Some(head) => *head != block.parent_hash,
            None => false,
        }
    }

    /// Returns up to `n` recent blocks, walking parent links from the tip,
    /// ordered tip to ancestor.
    pub fn recent(&self, n: usize) -> Result<Vec<Block>, KeeperError> {
        if n == 0 {
            return Err(KeeperError::InvalidArgument("n must be positive"));
        }

        let inner = self.inner.read();
        let mut blocks = Vec::with_capacity(n.min(inner.map.len()));
        let mut hash = inner.head.clone();
        while blocks.len() < n {
            let Some(block) = hash.as_ref().and_then(|hash| inner.map.get(hash)) else {
                break;
            };
            blocks.push(block.clone());
            hash = Some(block.parent_hash.clone());
        }
        Ok(blocks)
    }

    /// Returns the number of blocks currently in memory.
    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    /// Returns true if the keeper holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.inner.read().map.is_empty()
    }

    /// Returns the configured capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn block_ttl(&self, timestamp: u64) -> Duration {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let age = Duration::from_secs(now.saturating_sub(timestamp));
        self.ttl.saturating_sub(age).max(MIN_BLOCK_TTL)
    }
}
