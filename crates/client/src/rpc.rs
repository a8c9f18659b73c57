use crate::{
    adapter_for_chain, hex_string, ChainNode, ClientError, FilterQuery, HeadSubscription,
    HeaderAdapter,
};

use std::{fmt, sync::Arc, time::Duration};

use alloy_primitives::{Address, B256};
use alloy_provider::{Provider, ProviderBuilder, WsConnect};
use alloy_rpc_types_eth::{
    Block as RpcBlock, BlockNumberOrTag, BlockTransactions, Filter, Header as RpcHeader,
    Log as RpcLog, Transaction as RpcTransaction,
};
use blockfeed_primitives::{Header, Log, Transaction};
use futures::StreamExt;
use tokio::sync::mpsc;

/// A [`ChainNode`] over an alloy provider.
///
/// The provider should carry its own retry and rate-limiting layers; this
/// type only translates between the RPC surface and the canonical data
/// model. Header lookups go through the raw RPC so the per-family
/// [`HeaderAdapter`] sees the exact JSON shape the node produced.
pub struct RpcChainNode {
    provider: Box<dyn Provider + Send + Sync>,
    adapter: Arc<dyn HeaderAdapter>,
    chain_id: u64,
}

impl fmt::Debug for RpcChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChainNode").field("chain_id", &self.chain_id).finish_non_exhaustive()
    }
}

impl RpcChainNode {
    /// Dials a websocket endpoint, bounded by `timeout`.
    pub async fn connect_ws(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let connect = async {
            let provider = ProviderBuilder::new().connect_ws(WsConnect::new(url)).await?;
            Self::with_provider(Box::new(provider)).await
        };
        tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ClientError::DialTimeout(url.to_string()))?
    }

    /// Connects to an http endpoint, bounded by `timeout`.
    pub async fn connect_http(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let endpoint =
            url.parse().map_err(|_| ClientError::InvalidEndpoint(url.to_string()))?;
        let connect = async {
            let provider = ProviderBuilder::new().connect_http(endpoint);
            Self::with_provider(Box::new(provider)).await
        };
        tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ClientError::DialTimeout(url.to_string()))?
    }

    /// Wraps an established provider, resolving the chain id and the header
    /// adapter for its chain family.
    pub async fn with_provider(
        provider: Box<dyn Provider + Send + Sync>,
    ) -> Result<Self, ClientError> {
        let chain_id = provider.get_chain_id().await?;
        Ok(Self { provider, adapter: adapter_for_chain(chain_id), chain_id })
    }

    /// Returns the chain id reported by the node.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait::async_trait]
impl ChainNode for RpcChainNode {
    async fn block_number(&self) -> Result<u64, ClientError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError> {
        let subscription = self.provider.subscribe_blocks().await?;
        let (header_tx, header_rx) = mpsc::channel(64);
        let (error_tx, error_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut stream = subscription.into_stream();
            while let Some(header) = stream.next().await {
                if header_tx.send(canonical_header(&header)).await.is_err() {
                    return;
                }
            }
            // The transport dropped the subscription; surface it once so the
            // listener can resubscribe.
            tracing::debug!(target: "blockfeed::client", "new heads stream ended");
            let _ = error_tx.send(ClientError::SubscriptionClosed).await;
        });

        Ok(HeadSubscription::new(header_rx, error_rx).with_task(task))
    }

    async fn filter_logs(&self, query: FilterQuery) -> Result<Vec<Log>, ClientError> {
        let filter = to_filter(&query)?;
        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs.iter().map(canonical_log).collect())
    }

    async fn header_by_hash(&self, hash: &str) -> Result<Header, ClientError> {
        let block_hash = parse_b256(hash)?;
        let raw: Option<crate::RawHeader> = self
            .provider
            .client()
            .request("eth_getBlockByHash", (block_hash, false))
            .await?;
        let raw = raw.ok_or_else(|| ClientError::NotFound(hash.to_string()))?;
        self.adapter.adapt(raw)
    }

    async fn header_by_number(&self, number: Option<u64>) -> Result<Header, ClientError> {
        let tag = number.map(BlockNumberOrTag::Number).unwrap_or(BlockNumberOrTag::Latest);
        let raw: Option<crate::RawHeader> =
            self.provider.client().request("eth_getBlockByNumber", (tag, false)).await?;
        let raw = raw.ok_or_else(|| ClientError::NotFound(tag.to_string()))?;
        self.adapter.adapt(raw)
    }

    async fn transactions_by_hash(&self, hash: &str) -> Result<Vec<Transaction>, ClientError> {
        let block_hash = parse_b256(hash)?;
        let block: RpcBlock = self
            .provider
            .get_block_by_hash(block_hash)
            .full()
            .await?
            .ok_or_else(|| ClientError::NotFound(hash.to_string()))?;

        let transactions = match &block.transactions {
            BlockTransactions::Full(transactions) => {
                transactions.iter().map(canonical_transaction).collect()
            }
            _ => Vec::new(),
        };
        Ok(transactions)
    }
}

fn canonical_header(header: &RpcHeader) -> Header {
    Header {
        hash: hex_string(header.hash),
        parent_hash: hex_string(header.inner.parent_hash),
        number: header.inner.number,
        timestamp: header.inner.timestamp,
    }
}

fn canonical_log(log: &RpcLog) -> Log {
    Log {
        address: hex_string(log.inner.address),
        topics: log.topics().iter().map(|topic| hex_string(*topic)).collect(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number.unwrap_or_default(),
        tx_hash: log.transaction_hash.map(hex_string).unwrap_or_default(),
        tx_index: log.transaction_index.unwrap_or_default(),
        block_hash: log.block_hash.map(hex_string).unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        removed: log.removed,
    }
}

fn canonical_transaction(tx: &RpcTransaction) -> Transaction {
    use alloy_consensus::Transaction as _;

    Transaction {
        hash: hex_string(*tx.inner.tx_hash()),
        from: hex_string(tx.inner.signer()),
        to: tx.to().map(hex_string),
        nonce: tx.nonce(),
        gas: tx.gas_limit(),
        gas_price: tx.gas_price(),
        value: tx.value(),
        input: tx.input().clone(),
        index: tx.transaction_index.unwrap_or_default(),
    }
}

fn to_filter(query: &FilterQuery) -> Result<Filter, ClientError> {
    let mut filter = Filter::new();

    if let Some(hash) = &query.block_hash {
        filter = filter.at_block_hash(parse_b256(hash)?);
    }
    if let Some(from) = query.from_block {
        filter = filter.from_block(from);
    }
    if let Some(to) = query.to_block {
        filter = filter.to_block(to);
    }
    if !query.addresses.is_empty() {
        let addresses = query
            .addresses
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()?;
        filter = filter.address(addresses);
    }
    for (position, topics) in query.topics.iter().enumerate().take(4) {
        if topics.is_empty() {
            continue;
        }
        let topics =
            topics.iter().map(|topic| parse_b256(topic)).collect::<Result<Vec<_>, _>>()?;
        filter = match position {
            0 => filter.event_signature(topics),
            1 => filter.topic1(topics),
            2 => filter.topic2(topics),
            _ => filter.topic3(topics),
        };
    }

    Ok(filter)
}

fn parse_b256(value: &str) -> Result<B256, ClientError> {
    value.parse::<B256>().map_err(|_| ClientError::InvalidHex(value.to_string()))
}

fn parse_address(value: &str) -> Result<Address, ClientError> {
    value.parse::<Address>().map_err(|_| ClientError::InvalidHex(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_filter_rejects_bad_hex() {
        let query = FilterQuery::at_block_hash("0xnothex");
        assert!(matches!(to_filter(&query), Err(ClientError::InvalidHex(_))));
    }

    #[test]
    fn test_to_filter_accepts_topic_positions() {
        let query = FilterQuery {
            addresses: vec!["0x000000000000000000000000000000000000dead".into()],
            topics: vec![
                vec![
                    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".into(),
                ],
                vec![],
            ],
            ..Default::default()
        };
        assert!(to_filter(&query).is_ok());
    }
}
