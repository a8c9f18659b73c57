//! Message encoders for the downstream publishers.
//!
//! Two wire formats are supported: plain JSON, and protobuf compressed with
//! LZ4 behind a 4-byte big-endian uncompressed-length prefix. The format is
//! chosen by configuration; consumers decode with the matching
//! [`Encoder::decode`].

mod compress;
pub use compress::{
    compress_with_size_prepended, decompress_with_size_prepended, MAX_DECODED_LEN,
};

pub mod pb;

use blockfeed_primitives::Message;
use prost::Message as _;

/// An error raised while encoding or decoding a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A JSON serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A protobuf decoding failure.
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
    /// A protobuf payload carried a non-UTF-8 hash string.
    #[error("invalid utf-8 in protobuf payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// An LZ4 decompression failure.
    #[error("lz4 decompression error: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    /// The payload is too short to carry the length prefix.
    #[error("payload too short for length prefix")]
    FrameTooShort,
    /// The length prefix exceeds the decoder's sanity bound.
    #[error("length prefix {len} exceeds bound {max}")]
    FrameTooLarge {
        /// The declared uncompressed length.
        len: usize,
        /// The maximum the decoder accepts.
        max: usize,
    },
}

/// The message wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoder {
    /// Plain JSON.
    #[default]
    Json,
    /// Protobuf, LZ4-compressed, with a big-endian uncompressed-length
    /// prefix.
    Protobuf,
}

impl Encoder {
    /// Encodes a message into its wire representation.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Json => Ok(serde_json::to_vec(message)?),
            Self::Protobuf => {
                let encoded = pb::Message::from(message).encode_to_vec();
                Ok(compress_with_size_prepended(&encoded))
            }
        }
    }

    /// Decodes a wire payload back into a message.
    pub fn decode(&self, data: &[u8]) -> Result<Message, CodecError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(data)?),
            Self::Protobuf => {
                let raw = decompress_with_size_prepended(data)?;
                Message::try_from(pb::Message::decode(raw.as_slice())?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};
    use blockfeed_primitives::{Block, Header, Log, Transaction};

    fn sample_message() -> Message {
        let header = Header {
            hash: "0xbb".into(),
            parent_hash: "0xaa".into(),
            number: 11,
            timestamp: 1700000100,
        };
        let block = Block {
            number: 11,
            hash: "0xbb".into(),
            timestamp: 1700000100,
            parent_hash: "0xaa".into(),
            reorged_hash: Some("0xb0".into()),
            logs: vec![Log {
                address: "0x000000000000000000000000000000000000dead".into(),
                topics: vec!["0x01".into(), "0x02".into()],
                data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
                block_number: 11,
                tx_hash: "0x03".into(),
                tx_index: 2,
                block_hash: "0xbb".into(),
                log_index: 7,
                removed: false,
            }],
            transactions: Some(vec![Transaction {
                hash: "0x04".into(),
                from: "0x000000000000000000000000000000000000beef".into(),
                to: None,
                nonce: 9,
                gas: 21000,
                gas_price: Some(30_000_000_000),
                value: U256::from(1234u64),
                input: Bytes::from(vec![0x01]),
                index: 0,
            }]),
            header,
        };
        Message { reverted_blocks: vec![], new_blocks: vec![block] }
    }

    #[test]
    fn test_json_round_trip() {
        let message = sample_message();
        let encoded = Encoder::Json.encode(&message).unwrap();
        assert_eq!(Encoder::Json.decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_protobuf_round_trip() {
        let message = sample_message();
        let encoded = Encoder::Protobuf.encode(&message).unwrap();
        assert_eq!(Encoder::Protobuf.decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_protobuf_round_trip_empty_lists() {
        let message = Message::default();
        let encoded = Encoder::Protobuf.encode(&message).unwrap();
        assert_eq!(Encoder::Protobuf.decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_protobuf_frame_carries_uncompressed_length() {
        let message = sample_message();
        let encoded = Encoder::Protobuf.encode(&message).unwrap();
        let declared = u32::from_be_bytes(encoded[..4].try_into().unwrap()) as usize;

        let raw = prost::Message::encode_to_vec(&pb::Message::from(&message));
        assert_eq!(declared, raw.len());
    }

    #[test]
    fn test_protobuf_decode_rejects_mismatched_payload() {
        // A JSON payload is not a valid LZ4 frame for its own prefix.
        let encoded = Encoder::Json.encode(&sample_message()).unwrap();
        assert!(Encoder::Protobuf.decode(&encoded).is_err());
    }
}
