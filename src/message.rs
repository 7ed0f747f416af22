//! The two payload-bearing message shapes used by every operation except
//! Open: [`DataBody`] (eight scalar slots, no variable payload) and
//! [`BinBody`] (eight scalar slots plus a length-prefixed byte payload,
//! optionally compressed).

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::compression::CompressionCodec;
use crate::header::{Header, HEADER_LEN};
use crate::{Error, MessageKind};

/// Number of scalar `u64` slots carried by [`DataBody`] and [`BinBody`].
pub const QW_DATA_LEN: usize = 8;

/// On-wire size of the `qwData` extension shared by [`DataBody`] and
/// [`BinBody`].
const QW_DATA_BYTES: usize = QW_DATA_LEN * 8;

/// A message carrying only the header and eight scalar slots: used for
/// GetOption/SetOption requests and GetOption responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBody {
    /// The common header.
    pub header: Header,
    /// Per-message scalar parameters.
    pub qw_data: [u64; QW_DATA_LEN],
}

/// On-wire size of a [`DataBody`].
pub const DATA_BODY_LEN: usize = HEADER_LEN + QW_DATA_BYTES;

impl DataBody {
    /// Construct a new `DataBody` request of kind `kind`.
    pub fn new_request(kind: MessageKind, client_id: u32, flags: u32) -> Self {
        Self {
            header: Header::new_request(kind, client_id, DATA_BODY_LEN as u32, flags),
            qw_data: [0; QW_DATA_LEN],
        }
    }

    /// Serialise this body to a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Vec::with_capacity(DATA_BODY_LEN);
        self.header.encode_into(&mut buf)?;
        for v in &self.qw_data {
            buf.write_u64::<NativeEndian>(*v)?;
        }
        Ok(buf)
    }

    /// Parse a `DataBody` from a buffer whose header has already been
    /// validated by the caller (see [`crate::session::Session::submit`]).
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let header = Header::decode(buf)?;
        if buf.len() < DATA_BODY_LEN {
            return Err(Error::BadBodySize {
                kind: header.kind,
                got: buf.len(),
                wanted: DATA_BODY_LEN,
            });
        }

        let mut c = Cursor::new(&buf[HEADER_LEN..]);
        let mut qw_data = [0u64; QW_DATA_LEN];
        for slot in &mut qw_data {
            *slot = c.read_u64::<NativeEndian>()?;
        }

        Ok(Self { header, qw_data })
    }
}

/// A message carrying the header, eight scalar slots, and a length-prefixed
/// byte payload that may be compressed in transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinBody {
    /// The common header.
    pub header: Header,
    /// Size of `payload` as sent on the wire (the compressed size, if
    /// compression was applied).
    pub cb: u32,
    /// `0` if `payload` is plain; otherwise the size it decompresses to.
    pub cb_decompressed: u32,
    /// Per-message scalar parameters.
    pub qw_data: [u64; QW_DATA_LEN],
    /// The payload bytes, exactly `cb` long.
    pub payload: Vec<u8>,
}

/// On-wire size of a [`BinBody`] excluding the variable-length payload.
pub const BIN_BODY_FIXED_LEN: usize = HEADER_LEN + 4 + 4 + QW_DATA_BYTES;

impl BinBody {
    /// Construct a new `BinBody` request of kind `kind` carrying `payload`
    /// uncompressed; compression is applied afterwards by
    /// [`BinBody::compress_in_place`].
    pub fn new_request(kind: MessageKind, client_id: u32, flags: u32, payload: Vec<u8>) -> Self {
        let cb = payload.len() as u32;
        let length = (BIN_BODY_FIXED_LEN + payload.len()) as u32;
        Self {
            header: Header::new_request(kind, client_id, length, flags),
            cb,
            cb_decompressed: 0,
            qw_data: [0; QW_DATA_LEN],
            payload,
        }
    }

    /// Serialise this body to a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Vec::with_capacity(BIN_BODY_FIXED_LEN + self.payload.len());
        self.header.encode_into(&mut buf)?;
        buf.write_u32::<NativeEndian>(self.cb)?;
        buf.write_u32::<NativeEndian>(self.cb_decompressed)?;
        for v in &self.qw_data {
            buf.write_u64::<NativeEndian>(*v)?;
        }
        buf.write_all(&self.payload)?;
        Ok(buf)
    }

    /// Parse a `BinBody` from a buffer whose header has already been
    /// validated by the caller.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let header = Header::decode(buf)?;
        if buf.len() < BIN_BODY_FIXED_LEN {
            return Err(Error::BadBodySize {
                kind: header.kind,
                got: buf.len(),
                wanted: BIN_BODY_FIXED_LEN,
            });
        }

        let mut c = Cursor::new(&buf[HEADER_LEN..]);
        let cb = c.read_u32::<NativeEndian>()?;
        let cb_decompressed = c.read_u32::<NativeEndian>()?;
        let mut qw_data = [0u64; QW_DATA_LEN];
        for slot in &mut qw_data {
            *slot = c.read_u64::<NativeEndian>()?;
        }

        let wanted = BIN_BODY_FIXED_LEN + cb as usize;
        if buf.len() != wanted {
            return Err(Error::BadBodySize {
                kind: header.kind,
                got: buf.len(),
                wanted,
            });
        }

        let payload = buf[BIN_BODY_FIXED_LEN..].to_vec();

        Ok(Self {
            header,
            cb,
            cb_decompressed,
            qw_data,
            payload,
        })
    }

    /// Attempt to compress `self.payload` in place using `codec`, unless
    /// `disable` is set.
    ///
    /// On success the payload is replaced with the compressed bytes, `cb`
    /// and `cb_decompressed` are updated, and the header `length` is
    /// recomputed. If compression is disabled or the codec declines, the
    /// payload is left untouched and `cb_decompressed` is set to `0`.
    pub fn compress_in_place(&mut self, codec: &dyn CompressionCodec, disable: bool) {
        if !disable {
            if let Some(compressed) = codec.compress(&self.payload) {
                let original_len = self.payload.len() as u32;
                self.payload = compressed;
                self.cb = self.payload.len() as u32;
                self.cb_decompressed = original_len;
                self.header.length = (BIN_BODY_FIXED_LEN + self.payload.len()) as u32;
                return;
            }
        }
        self.cb_decompressed = 0;
    }

    /// If this body's payload is compressed (`cb_decompressed > 0`), decode
    /// it and return a new, plain `BinBody`. Otherwise returns a clone of
    /// `self` unchanged.
    pub fn decompressed(&self, codec: &dyn CompressionCodec) -> Result<Self, Error> {
        if self.cb_decompressed == 0 {
            return Ok(self.clone());
        }

        let payload = codec.decompress(&self.payload, self.cb_decompressed as usize)?;
        if payload.len() != self.cb_decompressed as usize {
            return Err(Error::Decompression);
        }

        let mut out = self.clone();
        out.cb = payload.len() as u32;
        out.cb_decompressed = 0;
        out.header.length = (BIN_BODY_FIXED_LEN + payload.len()) as u32;
        out.payload = payload;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::NullCodec;

    #[test]
    fn test_data_body_round_trip() {
        let mut b = DataBody::new_request(MessageKind::GetOptionReq, 42, 0);
        b.qw_data[0] = 0xdead_beef;
        let buf = b.encode().unwrap();
        assert_eq!(buf.len(), DATA_BODY_LEN);

        let got = DataBody::decode(&buf).unwrap();
        assert_eq!(got, b);
    }

    #[test]
    fn test_bin_body_round_trip() {
        let b = BinBody::new_request(MessageKind::CommandReq, 7, 0, vec![1, 2, 3, 4]);
        let buf = b.encode().unwrap();
        assert_eq!(buf.len(), BIN_BODY_FIXED_LEN + 4);

        let got = BinBody::decode(&buf).unwrap();
        assert_eq!(got, b);
    }

    #[test]
    fn test_bin_body_rejects_truncated_payload() {
        let b = BinBody::new_request(MessageKind::CommandReq, 7, 0, vec![1, 2, 3, 4]);
        let mut buf = b.encode().unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            BinBody::decode(&buf),
            Err(Error::BadBodySize { .. })
        ));
    }

    #[test]
    fn test_compress_in_place_disabled_sets_zero_cb_decompressed() {
        let codec = NullCodec;
        let mut b = BinBody::new_request(MessageKind::CommandReq, 1, 0, vec![9; 32]);
        b.compress_in_place(&codec, true);
        assert_eq!(b.cb_decompressed, 0);
        assert_eq!(b.cb, 32);
    }

    #[test]
    fn test_decompressed_passthrough_when_plain() {
        let codec = NullCodec;
        let b = BinBody::new_request(MessageKind::CommandReq, 1, 0, vec![1, 2, 3]);
        let out = b.decompressed(&codec).unwrap();
        assert_eq!(out, b);
    }

    /// A codec whose "compression" is simply prefixing the payload, used to
    /// exercise the compress/decompress round trip without a real codec.
    struct DoublingCodec;

    impl CompressionCodec for DoublingCodec {
        fn compress(&self, input: &[u8]) -> Option<Vec<u8>> {
            if input.is_empty() {
                return None;
            }
            Some(input.iter().step_by(2).copied().collect())
        }

        fn decompress(&self, input: &[u8], decompressed_len: usize) -> Result<Vec<u8>, Error> {
            let mut out = Vec::with_capacity(decompressed_len);
            for b in input {
                out.push(*b);
                out.push(*b);
            }
            out.truncate(decompressed_len);
            Ok(out)
        }
    }

    #[test]
    fn test_compress_then_decompress_round_trip() {
        let codec = DoublingCodec;
        let original = vec![1u8, 1, 2, 2, 3, 3, 4, 4];
        let mut b = BinBody::new_request(MessageKind::CommandReq, 1, 0, original.clone());
        b.compress_in_place(&codec, false);
        assert!(b.cb_decompressed > 0);
        assert!((b.cb as usize) < original.len());

        let out = b.decompressed(&codec).unwrap();
        assert_eq!(out.cb_decompressed, 0);
        assert_eq!(out.payload, original);
    }
}
