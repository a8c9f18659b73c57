//! Protobuf mirror of the message model.
//!
//! Messages are written by hand with prost derives so no protoc step is
//! needed. Hash and address strings are carried as UTF-8 bytes on the wire.

use crate::CodecError;

use alloy_primitives::{Bytes, U256};
use blockfeed_primitives as types;

/// The protobuf form of [`types::Log`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Log {
    /// The emitting contract address.
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    /// The indexed topics.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub topics: Vec<Vec<u8>>,
    /// The unindexed payload.
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    /// The containing block hash.
    #[prost(bytes = "vec", tag = "4")]
    pub block_hash: Vec<u8>,
    /// The containing block number.
    #[prost(uint64, tag = "5")]
    pub block_number: u64,
    /// The emitting transaction hash.
    #[prost(bytes = "vec", tag = "6")]
    pub transaction_hash: Vec<u8>,
    /// The emitting transaction index.
    #[prost(uint32, tag = "7")]
    pub transaction_index: u32,
    /// The log index within the block.
    #[prost(uint32, tag = "8")]
    pub log_index: u32,
    /// Whether the log was removed by a reorganization.
    #[prost(bool, tag = "9")]
    pub removed: bool,
}

/// The protobuf form of [`types::Transaction`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transaction {
    /// The transaction hash.
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    /// The sender address.
    #[prost(bytes = "vec", tag = "2")]
    pub from: Vec<u8>,
    /// The recipient address; empty for contract creations.
    #[prost(bytes = "vec", tag = "3")]
    pub to: Vec<u8>,
    /// The sender nonce.
    #[prost(uint64, tag = "4")]
    pub nonce: u64,
    /// The gas limit.
    #[prost(uint64, tag = "5")]
    pub gas: u64,
    /// The gas price as big-endian bytes; empty when absent.
    #[prost(bytes = "vec", tag = "6")]
    pub gas_price: Vec<u8>,
    /// The transferred value as 32 big-endian bytes.
    #[prost(bytes = "vec", tag = "7")]
    pub value: Vec<u8>,
    /// The calldata.
    #[prost(bytes = "vec", tag = "8")]
    pub input: Vec<u8>,
    /// The transaction index within the block.
    #[prost(uint32, tag = "9")]
    pub index: u32,
}

/// A list of transactions, present only when transaction hydration was
/// enabled for the block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionList {
    /// The transactions.
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<Transaction>,
}

/// The protobuf form of [`types::Block`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    /// The block number.
    #[prost(uint64, tag = "1")]
    pub number: u64,
    /// The block hash.
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
    /// The block timestamp.
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    /// The parent block hash.
    #[prost(bytes = "vec", tag = "4")]
    pub parent_hash: Vec<u8>,
    /// The displaced tip hash; empty when the block extended the chain.
    #[prost(bytes = "vec", tag = "5")]
    pub reorged_hash: Vec<u8>,
    /// The event logs.
    #[prost(message, repeated, tag = "6")]
    pub logs: Vec<Log>,
    /// The transactions, when hydrated.
    #[prost(message, optional, tag = "7")]
    pub transactions: Option<TransactionList>,
}

/// The protobuf form of [`types::Message`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    /// The reverted blocks, tip to ancestor.
    #[prost(message, repeated, tag = "1")]
    pub reverted_blocks: Vec<Block>,
    /// The new blocks, ancestor to tip.
    #[prost(message, repeated, tag = "2")]
    pub new_blocks: Vec<Block>,
}

impl From<&types::Log> for Log {
    fn from(log: &types::Log) -> Self {
        Self {
            address: log.address.clone().into_bytes(),
            topics: log.topics.iter().map(|topic| topic.clone().into_bytes()).collect(),
            data: log.data.to_vec(),
            block_hash: log.block_hash.clone().into_bytes(),
            block_number: log.block_number,
            transaction_hash: log.tx_hash.clone().into_bytes(),
            transaction_index: log.tx_index as u32,
            log_index: log.log_index as u32,
            removed: log.removed,
        }
    }
}

impl TryFrom<Log> for types::Log {
    type Error = CodecError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        Ok(Self {
            address: String::from_utf8(log.address)?,
            topics: log
                .topics
                .into_iter()
                .map(String::from_utf8)
                .collect::<Result<Vec<_>, _>>()?,
            data: Bytes::from(log.data),
            block_number: log.block_number,
            tx_hash: String::from_utf8(log.transaction_hash)?,
            tx_index: u64::from(log.transaction_index),
            block_hash: String::from_utf8(log.block_hash)?,
            log_index: u64::from(log.log_index),
            removed: log.removed,
        })
    }
}

impl From<&types::Transaction> for Transaction {
    fn from(tx: &types::Transaction) -> Self {
        Self {
            hash: tx.hash.clone().into_bytes(),
            from: tx.from.clone().into_bytes(),
            to: tx.to.clone().map(String::into_bytes).unwrap_or_default(),
            nonce: tx.nonce,
            gas: tx.gas,
            gas_price: tx.gas_price.map(|price| price.to_be_bytes().to_vec()).unwrap_or_default(),
            value: tx.value.to_be_bytes::<32>().to_vec(),
            input: tx.input.to_vec(),
            index: tx.index as u32,
        }
    }
}

impl TryFrom<Transaction> for types::Transaction {
    type Error = CodecError;

    fn try_from(tx: Transaction) -> Result<Self, Self::Error> {
        if tx.gas_price.len() > 16 || tx.value.len() > 32 {
            return Err(CodecError::Protobuf(prost::DecodeError::new(
                "numeric field exceeds its width",
            )));
        }
        let gas_price = if tx.gas_price.is_empty() {
            None
        } else {
            let mut bytes = [0u8; 16];
            bytes[16 - tx.gas_price.len()..].copy_from_slice(&tx.gas_price);
            Some(u128::from_be_bytes(bytes))
        };
        Ok(Self {
            hash: String::from_utf8(tx.hash)?,
            from: String::from_utf8(tx.from)?,
            to: if tx.to.is_empty() { None } else { Some(String::from_utf8(tx.to)?) },
            nonce: tx.nonce,
            gas: tx.gas,
            gas_price,
            value: U256::from_be_slice(&tx.value),
            input: Bytes::from(tx.input),
            index: u64::from(tx.index),
        })
    }
}

impl From<&types::Block> for Block {
    fn from(block: &types::Block) -> Self {
        Self {
            number: block.number,
            hash: block.hash.clone().into_bytes(),
            timestamp: block.timestamp,
            parent_hash: block.parent_hash.clone().into_bytes(),
            reorged_hash: block
                .reorged_hash
                .clone()
                .map(String::into_bytes)
                .unwrap_or_default(),
            logs: block.logs.iter().map(Log::from).collect(),
            transactions: block.transactions.as_ref().map(|transactions| TransactionList {
                items: transactions.iter().map(Transaction::from).collect(),
            }),
        }
    }
}

impl TryFrom<Block> for types::Block {
    type Error = CodecError;

    fn try_from(block: Block) -> Result<Self, Self::Error> {
        let hash = String::from_utf8(block.hash)?;
        let parent_hash = String::from_utf8(block.parent_hash)?;
        // The header duplicates the linking fields; it is reassembled rather
        // than carried on the wire.
        let header = types::Header {
            hash: hash.clone(),
            parent_hash: parent_hash.clone(),
            number: block.number,
            timestamp: block.timestamp,
        };
        Ok(Self {
            number: block.number,
            hash,
            timestamp: block.timestamp,
            parent_hash,
            reorged_hash: if block.reorged_hash.is_empty() {
                None
            } else {
                Some(String::from_utf8(block.reorged_hash)?)
            },
            logs: block
                .logs
                .into_iter()
                .map(types::Log::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            transactions: block
                .transactions
                .map(|list| {
                    list.items
                        .into_iter()
                        .map(types::Transaction::try_from)
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?,
            header,
        })
    }
}

impl From<&types::Message> for Message {
    fn from(message: &types::Message) -> Self {
        Self {
            reverted_blocks: message.reverted_blocks.iter().map(Block::from).collect(),
            new_blocks: message.new_blocks.iter().map(Block::from).collect(),
        }
    }
}

impl TryFrom<Message> for types::Message {
    type Error = CodecError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        Ok(Self {
            reverted_blocks: message
                .reverted_blocks
                .into_iter()
                .map(types::Block::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            new_blocks: message
                .new_blocks
                .into_iter()
                .map(types::Block::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}
