//! Translation of per-chain-family header shapes into the canonical
//! [`Header`].
//!
//! Most EVM chains report the block hash in their RPC header payloads, but
//! the families differ in which ancillary fields they carry and in how the
//! hash relates to the header contents. Each family gets its own
//! [`HeaderAdapter`]; [`adapter_for_chain`] picks the right one from the
//! chain id.

use crate::{hex_string, ClientError};

use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256, U64};
use alloy_rlp::Encodable;
use blockfeed_primitives::Header;
use serde::Deserialize;

/// A leniently decoded RPC header. Only the linking fields are required so a
/// single shape covers every supported family; adapters decide which of the
/// optional fields they insist on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHeader {
    /// The node-reported block hash, when the family provides one.
    #[serde(default)]
    pub hash: Option<B256>,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block number.
    pub number: U64,
    /// The block timestamp.
    pub timestamp: U64,
    /// The ommers hash.
    #[serde(default)]
    pub sha3_uncles: Option<B256>,
    /// The beneficiary of the block.
    #[serde(default)]
    pub miner: Option<Address>,
    /// The state trie root.
    #[serde(default)]
    pub state_root: Option<B256>,
    /// The transaction trie root.
    #[serde(default)]
    pub transactions_root: Option<B256>,
    /// The receipt trie root.
    #[serde(default)]
    pub receipts_root: Option<B256>,
    /// The logs bloom filter.
    #[serde(default)]
    pub logs_bloom: Option<Bloom>,
    /// The block difficulty.
    #[serde(default)]
    pub difficulty: Option<U256>,
    /// The block gas limit.
    #[serde(default)]
    pub gas_limit: Option<U64>,
    /// The gas used by the block.
    #[serde(default)]
    pub gas_used: Option<U64>,
    /// The extra data of the block.
    #[serde(default)]
    pub extra_data: Option<Bytes>,
    /// The mix digest of the block.
    #[serde(default)]
    pub mix_hash: Option<B256>,
    /// The proof-of-work nonce.
    #[serde(default)]
    pub nonce: Option<B64>,
    /// The EIP-1559 base fee.
    #[serde(default)]
    pub base_fee_per_gas: Option<U64>,
    /// The Avalanche extended data hash.
    #[serde(default)]
    pub ext_data_hash: Option<B256>,
    /// The Avalanche extended data gas used.
    #[serde(default)]
    pub ext_data_gas_used: Option<U256>,
    /// The Avalanche block gas cost.
    #[serde(default)]
    pub block_gas_cost: Option<U256>,
}

impl RawHeader {
    fn canonical(&self, hash: B256) -> Header {
        Header {
            hash: hex_string(hash),
            parent_hash: hex_string(self.parent_hash),
            number: self.number.to::<u64>(),
            timestamp: self.timestamp.to::<u64>(),
        }
    }
}

/// Translates one chain family's header shape into the canonical [`Header`].
pub trait HeaderAdapter: Send + Sync + std::fmt::Debug {
    /// Translates a raw RPC header.
    fn adapt(&self, raw: RawHeader) -> Result<Header, ClientError>;
}

/// The adapter for geth-family chains. The node always reports the hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthereumAdapter;

impl HeaderAdapter for EthereumAdapter {
    fn adapt(&self, raw: RawHeader) -> Result<Header, ClientError> {
        let hash = raw
            .hash
            .ok_or_else(|| ClientError::InvalidHeader("header is missing the hash field".into()))?;
        Ok(raw.canonical(hash))
    }
}

/// The adapter for Fantom. Fantom headers omit several geth fields and their
/// hash cannot be recomputed from the payload, so the reported hash field is
/// authoritative.
#[derive(Debug, Clone, Copy, Default)]
pub struct FantomAdapter;

impl HeaderAdapter for FantomAdapter {
    fn adapt(&self, raw: RawHeader) -> Result<Header, ClientError> {
        hash_field_header(raw, "fantom")
    }
}

/// The adapter for zkSync Era. The hash is a protocol-level field, not a
/// digest of the header payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZkSyncAdapter;

impl HeaderAdapter for ZkSyncAdapter {
    fn adapt(&self, raw: RawHeader) -> Result<Header, ClientError> {
        hash_field_header(raw, "zksync")
    }
}

fn hash_field_header(raw: RawHeader, family: &str) -> Result<Header, ClientError> {
    let hash = raw.hash.ok_or_else(|| {
        ClientError::InvalidHeader(format!("{family} header is missing the hash field"))
    })?;
    Ok(raw.canonical(hash))
}

/// The adapter for Avalanche C-Chain. Avalanche headers carry an
/// `extDataHash` that participates in the header digest; when the node does
/// not report a hash, it is recomputed from the RLP encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvalancheAdapter;

impl HeaderAdapter for AvalancheAdapter {
    fn adapt(&self, raw: RawHeader) -> Result<Header, ClientError> {
        let hash = match raw.hash {
            Some(hash) => hash,
            None => avalanche_header_hash(&raw)?,
        };
        Ok(raw.canonical(hash))
    }
}

fn required<'a, T>(field: &'a Option<T>, name: &str) -> Result<&'a T, ClientError> {
    field
        .as_ref()
        .ok_or_else(|| ClientError::InvalidHeader(format!("avalanche header is missing {name}")))
}

/// Computes keccak256 of the RLP encoding of an Avalanche header. Trailing
/// optional fields are encoded only while contiguously present.
fn avalanche_header_hash(raw: &RawHeader) -> Result<B256, ClientError> {
    let mut payload = Vec::new();

    raw.parent_hash.encode(&mut payload);
    required(&raw.sha3_uncles, "sha3Uncles")?.encode(&mut payload);
    required(&raw.miner, "miner")?.encode(&mut payload);
    required(&raw.state_root, "stateRoot")?.encode(&mut payload);
    required(&raw.transactions_root, "transactionsRoot")?.encode(&mut payload);
    required(&raw.receipts_root, "receiptsRoot")?.encode(&mut payload);
    required(&raw.logs_bloom, "logsBloom")?.encode(&mut payload);
    required(&raw.difficulty, "difficulty")?.encode(&mut payload);
    raw.number.to::<u64>().encode(&mut payload);
    required(&raw.gas_limit, "gasLimit")?.to::<u64>().encode(&mut payload);
    required(&raw.gas_used, "gasUsed")?.to::<u64>().encode(&mut payload);
    raw.timestamp.to::<u64>().encode(&mut payload);
    required(&raw.extra_data, "extraData")?.encode(&mut payload);
    raw.mix_hash.unwrap_or_default().encode(&mut payload);
    raw.nonce.unwrap_or_default().encode(&mut payload);
    required(&raw.ext_data_hash, "extDataHash")?.encode(&mut payload);

    if let Some(base_fee) = raw.base_fee_per_gas {
        base_fee.to::<u64>().encode(&mut payload);
        if let Some(ext_data_gas_used) = raw.ext_data_gas_used {
            ext_data_gas_used.encode(&mut payload);
            if let Some(block_gas_cost) = raw.block_gas_cost {
                block_gas_cost.encode(&mut payload);
            }
        }
    }

    let mut encoded = Vec::with_capacity(payload.len() + 4);
    alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(&mut encoded);
    encoded.extend_from_slice(&payload);

    Ok(keccak256(&encoded))
}

/// Chain ids with family-specific header handling.
pub const CHAIN_ID_FANTOM: u64 = 250;
/// The zkSync Era chain id.
pub const CHAIN_ID_ZKSYNC: u64 = 324;
/// The Avalanche C-Chain chain id.
pub const CHAIN_ID_AVALANCHE: u64 = 43114;

/// Returns the header adapter for the given chain id.
pub fn adapter_for_chain(chain_id: u64) -> Arc<dyn HeaderAdapter> {
    match chain_id {
        CHAIN_ID_FANTOM => Arc::new(FantomAdapter),
        CHAIN_ID_ZKSYNC => Arc::new(ZkSyncAdapter),
        CHAIN_ID_AVALANCHE => Arc::new(AvalancheAdapter),
        _ => Arc::new(EthereumAdapter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(value: serde_json::Value) -> RawHeader {
        serde_json::from_value(value).unwrap()
    }

    fn full_avalanche_header() -> serde_json::Value {
        serde_json::json!({
            "parentHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            "miner": "0x0100000000000000000000000000000000000000",
            "stateRoot": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "transactionsRoot": "0x3333333333333333333333333333333333333333333333333333333333333333",
            "receiptsRoot": "0x4444444444444444444444444444444444444444444444444444444444444444",
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "difficulty": "0x1",
            "number": "0x2a",
            "gasLimit": "0x7a1200",
            "gasUsed": "0x5208",
            "timestamp": "0x64000000",
            "extraData": "0x",
            "mixHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "nonce": "0x0000000000000000",
            "extDataHash": "0x5555555555555555555555555555555555555555555555555555555555555555",
            "baseFeePerGas": "0x5d21dba00",
        })
    }

    #[test]
    fn test_lenient_decode_keeps_linking_fields() {
        // A fantom-shaped header missing most geth fields still decodes.
        let raw = raw_header(serde_json::json!({
            "hash": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "parentHash": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "number": "0x10",
            "timestamp": "0x64",
        }));
        let header = FantomAdapter.adapt(raw).unwrap();
        assert_eq!(
            header.hash,
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(header.number, 16);
        assert_eq!(header.timestamp, 100);
    }

    #[test]
    fn test_ethereum_adapter_requires_hash() {
        let raw = raw_header(serde_json::json!({
            "parentHash": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "number": "0x10",
            "timestamp": "0x64",
        }));
        assert!(matches!(EthereumAdapter.adapt(raw), Err(ClientError::InvalidHeader(_))));
    }

    #[test]
    fn test_avalanche_adapter_prefers_reported_hash() {
        let mut value = full_avalanche_header();
        value["hash"] =
            "0xcccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc".into();
        let header = AvalancheAdapter.adapt(raw_header(value)).unwrap();
        assert_eq!(
            header.hash,
            "0xcccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc"
        );
    }

    #[test]
    fn test_avalanche_hash_is_deterministic_over_ext_data() {
        let value = full_avalanche_header();
        let first = AvalancheAdapter.adapt(raw_header(value.clone())).unwrap();
        let second = AvalancheAdapter.adapt(raw_header(value.clone())).unwrap();
        assert_eq!(first.hash, second.hash);
        assert!(first.hash.starts_with("0x") && first.hash.len() == 66);

        let mut changed = value;
        changed["extDataHash"] =
            "0x6666666666666666666666666666666666666666666666666666666666666666".into();
        let third = AvalancheAdapter.adapt(raw_header(changed)).unwrap();
        assert_ne!(first.hash, third.hash);
    }

    #[test]
    fn test_dispatch_by_chain_id() {
        // Spot check through behavior: the default adapter rejects a missing
        // hash, the avalanche adapter recomputes it.
        let no_hash = raw_header(full_avalanche_header());
        assert!(adapter_for_chain(1).adapt(no_hash.clone()).is_err());
        assert!(adapter_for_chain(CHAIN_ID_AVALANCHE).adapt(no_hash).is_ok());
    }
}
