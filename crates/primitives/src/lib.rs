//! Core data model for the blockfeed block-event ingester.
//!
//! Hashes and addresses are lowercase `0x`-prefixed hex strings everywhere in
//! the core; conversion to and from raw bytes is confined to the RPC client
//! and the message codecs.

use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

/// A block header as received from the `newHeads` subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// The block hash.
    pub hash: String,
    /// The hash of the parent block.
    pub parent_hash: String,
    /// The block number.
    pub number: u64,
    /// The block timestamp, in seconds since the unix epoch.
    pub timestamp: u64,
}

/// A fully hydrated block: header fields plus the event logs emitted in the
/// block and, optionally, its transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: String,
    /// The block timestamp, in seconds since the unix epoch.
    pub timestamp: u64,
    /// The hash of the parent block.
    pub parent_hash: String,
    /// The hash that was the local tip when this block was inserted, if this
    /// block did not extend it. Advisory only: the reorg resolver does not
    /// depend on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorged_hash: Option<String>,
    /// The event logs emitted in this block.
    #[serde(default)]
    pub logs: Vec<Log>,
    /// The transactions included in this block, when transaction hydration is
    /// enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    /// The header this block was hydrated from.
    #[serde(default)]
    pub header: Header,
}

impl Block {
    /// Assembles a block from a header and its hydrated payload.
    pub fn from_header(
        header: &Header,
        logs: Vec<Log>,
        transactions: Option<Vec<Transaction>>,
    ) -> Self {
        Self {
            number: header.number,
            hash: header.hash.clone(),
            timestamp: header.timestamp,
            parent_hash: header.parent_hash.clone(),
            reorged_hash: None,
            logs,
            transactions,
            header: header.clone(),
        }
    }
}

/// An event log emitted by a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// The address of the contract that emitted the log.
    pub address: String,
    /// The indexed topics of the log.
    pub topics: Vec<String>,
    /// The unindexed payload of the log.
    pub data: Bytes,
    /// The number of the block this log was emitted in.
    pub block_number: u64,
    /// The hash of the transaction this log was emitted by.
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    /// The index of the transaction within its block.
    #[serde(rename = "transactionIndex")]
    pub tx_index: u64,
    /// The hash of the block this log was emitted in.
    pub block_hash: String,
    /// The index of the log within its block.
    pub log_index: u64,
    /// Whether the log was removed by a chain reorganization.
    pub removed: bool,
}

/// A transaction included in a hydrated block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The transaction hash.
    pub hash: String,
    /// The sender of the transaction.
    pub from: String,
    /// The recipient of the transaction. `None` for contract creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// The sender nonce.
    pub nonce: u64,
    /// The gas limit of the transaction.
    pub gas: u64,
    /// The gas price, for transactions that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    /// The value transferred by the transaction.
    pub value: U256,
    /// The calldata of the transaction.
    pub input: Bytes,
    /// The index of the transaction within its block.
    #[serde(rename = "transactionIndex")]
    pub index: u64,
}

/// The message published downstream for every handled head: the blocks the
/// consumer must revert, newest first, and the blocks it must apply, oldest
/// first. Either list may be empty; a message with both lists empty is never
/// published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The blocks no longer on the canonical chain, ordered tip to ancestor.
    pub reverted_blocks: Vec<Block>,
    /// The blocks newly on the canonical chain, ordered ancestor to tip.
    pub new_blocks: Vec<Block>,
}
