//! Common test helpers: deterministic chain builders, a scriptable chain
//! node and a recording publisher.

/// A scriptable [`crate::ChainWalker`]-compatible chain node.
pub mod node;

mod publisher;
pub use publisher::RecordingPublisher;

use blockfeed_primitives::{Block, Header, Log};

/// Returns a random lowercase hex hash string.
pub fn random_hash() -> String {
    let bytes: [u8; 32] = rand::random();
    let mut hash = String::with_capacity(66);
    hash.push_str("0x");
    for byte in bytes {
        hash.push_str(&format!("{byte:02x}"));
    }
    hash
}

/// Returns the header extending `parent`.
pub fn next_header(parent: &Header) -> Header {
    Header {
        hash: random_hash(),
        parent_hash: parent.hash.clone(),
        number: parent.number + 1,
        timestamp: parent.timestamp + 12,
    }
}

/// Returns a linked chain of `len` random headers, numbered from 1.
pub fn chain(len: u64) -> Vec<Header> {
    assert!(len >= 1, "chain should have a minimal length of one");

    let mut headers = Vec::with_capacity(len as usize);
    headers.push(Header {
        hash: random_hash(),
        parent_hash: random_hash(),
        number: 1,
        timestamp: 1_700_000_000,
    });
    for i in 1..len as usize {
        headers.push(next_header(&headers[i - 1]));
    }
    headers
}

/// Returns a fork of `len` random headers extending `parent`.
pub fn chain_from(parent: &Header, len: u64) -> Vec<Header> {
    assert!(len >= 1, "fork should have a minimal length of one");

    let mut headers = Vec::with_capacity(len as usize);
    headers.push(next_header(parent));
    for i in 1..len as usize {
        headers.push(next_header(&headers[i - 1]));
    }
    headers
}

/// Returns a block materialized from a header, with a single log so
/// hydration-shaped tests skip the empty-log retry.
pub fn block_for(header: &Header) -> Block {
    Block::from_header(header, vec![log_for(header)], None)
}

/// Returns a log anchored in the given header.
pub fn log_for(header: &Header) -> Log {
    Log {
        address: "0x000000000000000000000000000000000000dead".into(),
        topics: vec!["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".into()],
        data: vec![0x01].into(),
        block_number: header.number,
        tx_hash: random_hash(),
        tx_index: 0,
        block_hash: header.hash.clone(),
        log_index: 0,
        removed: false,
    }
}
