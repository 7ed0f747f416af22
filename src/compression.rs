//! Compression is an opaque, externally supplied codec (see `SPEC_FULL.md`
//! §2.3): this crate only negotiates *whether* it is used and stamps the
//! `cb`/`cbDecompressed` fields correctly, never interprets the compressed
//! bytes itself.

use crate::Error;

/// A pluggable codec used to compress outbound [`BinBody`](crate::BinBody)
/// payloads and decompress inbound ones.
///
/// Implementations are opaque to the protocol: a codec may refuse to
/// compress a given payload (returning `None` from [`compress`]) and the
/// session will fall back to sending it uncompressed.
///
/// [`compress`]: CompressionCodec::compress
pub trait CompressionCodec: Send + Sync {
    /// One-time, possibly fallible setup. Returns `false` if this codec
    /// cannot be used for the lifetime of the session (the session then
    /// behaves as though compression was never requested).
    fn initialize(&mut self) -> bool {
        true
    }

    /// Attempt to compress `input`, returning `None` if compression is not
    /// possible or would not shrink the payload.
    fn compress(&self, input: &[u8]) -> Option<Vec<u8>>;

    /// Decompress `input`, which is known to decode to exactly
    /// `decompressed_len` bytes.
    fn decompress(&self, input: &[u8], decompressed_len: usize) -> Result<Vec<u8>, Error>;
}

/// A codec that never compresses anything.
///
/// This is the crate's built-in stand-in for the real, externally supplied
/// compression codec referenced in `SPEC_FULL.md` §2.3: it reports itself as
/// initialized so sessions can be exercised end-to-end without a real
/// compressor, but [`compress`](CompressionCodec::compress) always declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCodec;

impl CompressionCodec for NullCodec {
    fn compress(&self, _input: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn decompress(&self, _input: &[u8], _decompressed_len: usize) -> Result<Vec<u8>, Error> {
        Err(Error::Decompression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_codec_never_compresses() {
        let c = NullCodec;
        assert_eq!(c.compress(b"hello world"), None);
    }

    #[test]
    fn test_null_codec_decompress_fails() {
        let c = NullCodec;
        assert_eq!(c.decompress(&[1, 2, 3], 3), Err(Error::Decompression));
    }
}
