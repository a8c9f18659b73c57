//! Uniform view over EVM chain node RPC variants.
//!
//! The [`ChainNode`] trait is the only contract the rest of the service
//! consumes: current block number, a `newHeads` subscription, log filtering
//! and header lookups. [`RpcChainNode`] implements it over an alloy provider
//! and translates per-chain-family header shapes through a [`HeaderAdapter`].

mod error;
pub use error::ClientError;

mod adapter;
pub use adapter::{
    adapter_for_chain, AvalancheAdapter, EthereumAdapter, FantomAdapter, HeaderAdapter, RawHeader,
    ZkSyncAdapter, CHAIN_ID_AVALANCHE, CHAIN_ID_FANTOM, CHAIN_ID_ZKSYNC,
};

mod chains;
pub use chains::chain_name;

mod rpc;
pub use rpc::RpcChainNode;

use blockfeed_primitives::{Header, Log, Transaction};
use tokio::{sync::mpsc, task::JoinHandle};

/// A log filter. Empty `addresses`/`topics` match everything.
#[derive(Debug, Clone, Default)]
pub struct FilterQuery {
    /// Restrict the query to a single block hash.
    pub block_hash: Option<String>,
    /// The first block of the queried range.
    pub from_block: Option<u64>,
    /// The last block of the queried range.
    pub to_block: Option<u64>,
    /// Contract addresses to match.
    pub addresses: Vec<String>,
    /// Positional topic sets to match.
    pub topics: Vec<Vec<String>>,
}

impl FilterQuery {
    /// Returns a query matching all logs of a single block.
    pub fn at_block_hash(hash: impl Into<String>) -> Self {
        Self { block_hash: Some(hash.into()), ..Default::default() }
    }
}

/// A live `newHeads` subscription.
///
/// The error side fires at most once; after it the subscription is dead and
/// the caller is expected to resubscribe.
#[derive(Debug)]
pub struct HeadSubscription {
    headers: mpsc::Receiver<Header>,
    errors: mpsc::Receiver<ClientError>,
    task: Option<JoinHandle<()>>,
}

impl HeadSubscription {
    /// Returns a subscription reading from the given channels.
    pub fn new(headers: mpsc::Receiver<Header>, errors: mpsc::Receiver<ClientError>) -> Self {
        Self { headers, errors, task: None }
    }

    /// Attaches the pump task driving the channels; it is aborted when the
    /// subscription is dropped.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Returns the next header. `Ok(None)` means the subscription ended
    /// without an error (the channel closed); an `Err` is terminal.
    ///
    /// Buffered headers are drained before a pending error is reported.
    pub async fn next(&mut self) -> Result<Option<Header>, ClientError> {
        tokio::select! {
            biased;
            header = self.headers.recv() => match header {
                Some(header) => Ok(Some(header)),
                // The header side closed; surface the terminal error if one
                // was queued.
                None => match self.errors.try_recv() {
                    Ok(err) => Err(err),
                    Err(_) => Ok(None),
                },
            },
            Some(err) = self.errors.recv() => Err(err),
        }
    }

    /// Tears the subscription down.
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HeadSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The view over a chain node consumed by the listener pipeline.
#[async_trait::async_trait]
pub trait ChainNode: Send + Sync + std::fmt::Debug {
    /// Returns the current block number of the node.
    async fn block_number(&self) -> Result<u64, ClientError>;

    /// Opens a `newHeads` subscription.
    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError>;

    /// Returns the logs matching the query.
    async fn filter_logs(&self, query: FilterQuery) -> Result<Vec<Log>, ClientError>;

    /// Returns the header with the given hash.
    async fn header_by_hash(&self, hash: &str) -> Result<Header, ClientError>;

    /// Returns the header at the given height, or the latest header when
    /// `number` is `None`.
    async fn header_by_number(&self, number: Option<u64>) -> Result<Header, ClientError>;

    /// Returns the transactions of the block with the given hash.
    async fn transactions_by_hash(&self, hash: &str) -> Result<Vec<Transaction>, ClientError>;
}

pub(crate) fn hex_string<T: core::fmt::LowerHex>(value: T) -> String {
    format!("{value:#x}")
}
