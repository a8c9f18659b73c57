use crate::CodecError;

/// The size of the length prefix, in bytes.
const PREFIX_LEN: usize = 4;

/// The largest uncompressed payload the decoder will accept.
pub const MAX_DECODED_LEN: usize = 64 << 20;

/// LZ4-compresses `input` and prepends its uncompressed length as a 4-byte
/// big-endian integer.
pub fn compress_with_size_prepended(input: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::block::compress(input);
    let mut out = Vec::with_capacity(PREFIX_LEN + compressed.len());
    out.extend_from_slice(&(input.len() as u32).to_be_bytes());
    out.extend_from_slice(&compressed);
    out
}

/// Reverses [`compress_with_size_prepended`], refusing frames whose declared
/// length exceeds [`MAX_DECODED_LEN`].
pub fn decompress_with_size_prepended(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    if input.len() < PREFIX_LEN {
        return Err(CodecError::FrameTooShort);
    }
    let (prefix, compressed) = input.split_at(PREFIX_LEN);
    let len = u32::from_be_bytes(prefix.try_into().expect("prefix is 4 bytes")) as usize;
    if len > MAX_DECODED_LEN {
        return Err(CodecError::FrameTooLarge { len, max: MAX_DECODED_LEN });
    }
    Ok(lz4_flex::block::decompress(compressed, len)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let input = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let framed = compress_with_size_prepended(&input);
        assert!(framed.len() < input.len() + PREFIX_LEN);
        assert_eq!(decompress_with_size_prepended(&framed).unwrap(), input);
    }

    #[test]
    fn test_compress_empty_input() {
        let framed = compress_with_size_prepended(b"");
        assert_eq!(decompress_with_size_prepended(&framed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decompress_rejects_short_frame() {
        assert!(matches!(
            decompress_with_size_prepended(&[0, 0, 1]),
            Err(CodecError::FrameTooShort)
        ));
    }

    #[test]
    fn test_decompress_rejects_oversized_prefix() {
        let mut framed = compress_with_size_prepended(b"payload");
        framed[..4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decompress_with_size_prepended(&framed),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }
}
