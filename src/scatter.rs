//! Scatter I/O: the `MemScatter` descriptor, the request/response payload
//! shapes built from arrays of them, and the chunker that splits arbitrarily
//! large descriptor lists into bounded chunks before handing each to the
//! request engine.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::Error;

/// Constant descriptor version stamped into every `MemScatter` and checked
/// on every one received from the remote.
pub const MEM_SCATTER_VERSION: u32 = 0xc0ca_0001;

/// Maximum payload length of a single descriptor, and the per-descriptor
/// write-data slot size.
pub const MEM_SCATTER_PAGE: usize = 4096;

/// Maximum number of descriptors processed in a single request/response
/// round trip; larger inputs are chunked by [`chunks`].
pub const MEM_SCATTER_CHUNK: usize = 4096;

/// On-wire size of a single [`MemScatter`] descriptor header (the buffer
/// contents travel separately, in the surrounding message's payload area).
pub(crate) const MEM_SCATTER_LEN: usize = 4 + 8 + 4 + 4 + 4; // version, address, length, flags, done(as u32)

/// A single scatter I/O descriptor: an address, a length, and (after a
/// completed read, or before a write) the associated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemScatter {
    /// Target address.
    pub address: u64,
    /// Length of `buffer` in bytes; must be `<= MEM_SCATTER_PAGE`.
    pub length: u32,
    /// Opaque per-descriptor flags, echoed by the remote.
    pub flags: u32,
    /// `true` once this descriptor's operation has completed (successfully
    /// or not, for reads; always reflects remote-reported success).
    pub done: bool,
    /// For a write, the bytes to send. For a read, filled in from the
    /// response on success; left empty otherwise.
    pub buffer: Vec<u8>,
}

impl MemScatter {
    /// Construct a new, pending descriptor for `address`/`length`, with an
    /// empty buffer.
    pub fn new(address: u64, length: u32) -> Self {
        Self {
            address,
            length,
            flags: 0,
            done: false,
            buffer: Vec::new(),
        }
    }

    /// `true` if `address` is a value this protocol considers addressable
    /// (i.e. not the sentinel all-ones "invalid" address).
    pub fn address_is_valid(&self) -> bool {
        self.address != u64::MAX
    }

    fn encode_descriptor(&self, buf: &mut Vec<u8>) -> Result<(), std::io::Error> {
        buf.write_u32::<NativeEndian>(MEM_SCATTER_VERSION)?;
        buf.write_u64::<NativeEndian>(self.address)?;
        buf.write_u32::<NativeEndian>(self.length)?;
        buf.write_u32::<NativeEndian>(self.flags)?;
        buf.write_u32::<NativeEndian>(self.done as u32)?;
        Ok(())
    }

    fn decode_descriptor(c: &mut Cursor<&[u8]>) -> Result<(u32, u64, u32, u32, bool), Error> {
        let version = c.read_u32::<NativeEndian>()?;
        let address = c.read_u64::<NativeEndian>()?;
        let length = c.read_u32::<NativeEndian>()?;
        let flags = c.read_u32::<NativeEndian>()?;
        let done = c.read_u32::<NativeEndian>()? != 0;
        Ok((version, address, length, flags, done))
    }
}

/// Split `descriptors` into chunks of at most [`MEM_SCATTER_CHUNK`]
/// elements, preserving order.
pub(crate) fn chunks(descriptors: &mut [MemScatter]) -> impl Iterator<Item = &mut [MemScatter]> {
    descriptors.chunks_mut(MEM_SCATTER_CHUNK)
}

/// Build the request payload for a `ReadScatterReq` covering one chunk,
/// returning the encoded bytes plus `(count_valid, total_cb)` for the
/// request's `qwData` slots.
///
/// Descriptors already `done`, or whose address fails
/// [`MemScatter::address_is_valid`], are skipped. A descriptor whose
/// `length` exceeds [`MEM_SCATTER_PAGE`] aborts the whole chunk.
pub(crate) fn build_read_request(chunk: &[MemScatter]) -> Result<(Vec<u8>, u32, u64), Error> {
    let mut buf = Vec::new();
    let mut count_valid = 0u32;
    let mut total_cb = 0u64;
    for mem in chunk {
        if mem.length as usize > MEM_SCATTER_PAGE {
            return Err(Error::InvalidScatterDescriptor);
        }
        if mem.done || !mem.address_is_valid() {
            continue;
        }
        mem.encode_descriptor(&mut buf)?;
        count_valid += 1;
        total_cb += mem.length as u64;
    }
    Ok((buf, count_valid, total_cb))
}

/// Apply a `ReadScatterRsp` payload (`count_valid` descriptors followed by
/// the concatenated read buffers) back onto `chunk`, mutating `done` and
/// `buffer` in place.
///
/// Per the address-association invariant, a response descriptor whose
/// version is wrong or whose address does not match the corresponding
/// pending input stops processing of the rest of the chunk; descriptors not
/// yet visited are left unchanged.
pub(crate) fn apply_read_response(
    chunk: &mut [MemScatter],
    count_valid: u32,
    payload: &[u8],
) -> Result<(), Error> {
    let header_bytes = count_valid as usize * MEM_SCATTER_LEN;
    if payload.len() < header_bytes {
        return Err(Error::InvalidScatterDescriptor);
    }

    let mut descriptor_cursor = Cursor::new(&payload[..header_bytes]);
    let mut data_offset = header_bytes;

    for mem in chunk.iter_mut() {
        if mem.done || !mem.address_is_valid() {
            continue;
        }

        let (version, address, _resp_length, _flags, done) =
            MemScatter::decode_descriptor(&mut descriptor_cursor)?;

        if version != MEM_SCATTER_VERSION || address != mem.address {
            break;
        }
        let len = mem.length as usize;
        if len > payload.len().saturating_sub(data_offset) {
            break;
        }

        mem.done = done;
        if done {
            mem.buffer = payload[data_offset..data_offset + len].to_vec();
            data_offset += len;
        }
    }

    Ok(())
}

/// Build the request payload for a `WriteScatterReq` covering one chunk:
/// `N` descriptors followed by one `MEM_SCATTER_PAGE`-sized slot per
/// descriptor, padded with zero bytes beyond each descriptor's actual
/// `length`.
pub(crate) fn build_write_request(chunk: &[MemScatter]) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(chunk.len() * (MEM_SCATTER_LEN + MEM_SCATTER_PAGE));
    for mem in chunk {
        if mem.length as usize > MEM_SCATTER_PAGE {
            return Err(Error::InvalidScatterDescriptor);
        }
        mem.encode_descriptor(&mut buf)?;
    }
    for mem in chunk {
        let n = mem.length as usize;
        buf.write_all(&mem.buffer[..n.min(mem.buffer.len())])?;
        if mem.buffer.len() < n {
            buf.write_all(&vec![0u8; n - mem.buffer.len()])?;
        }
    }
    Ok(buf)
}

/// Apply a `WriteScatterRsp` payload (one `u32` boolean per descriptor)
/// back onto `chunk`'s `done` bits.
pub(crate) fn apply_write_response(chunk: &mut [MemScatter], payload: &[u8]) -> Result<(), Error> {
    if payload.len() < chunk.len() * 4 {
        return Err(Error::InvalidScatterDescriptor);
    }
    let mut c = Cursor::new(payload);
    for mem in chunk.iter_mut() {
        mem.done = c.read_u32::<NativeEndian>()? != 0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_read_request_skips_done_and_invalid() {
        let chunk = vec![
            MemScatter::new(0x1000, 16),
            {
                let mut m = MemScatter::new(0x2000, 16);
                m.done = true;
                m
            },
            MemScatter::new(u64::MAX, 16),
        ];
        let (buf, count_valid, total_cb) = build_read_request(&chunk).unwrap();
        assert_eq!(count_valid, 1);
        assert_eq!(total_cb, 16);
        assert_eq!(buf.len(), MEM_SCATTER_LEN);
    }

    #[test]
    fn test_build_read_request_rejects_oversized_descriptor() {
        let chunk = vec![MemScatter::new(0x1000, (MEM_SCATTER_PAGE + 1) as u32)];
        assert_eq!(
            build_read_request(&chunk),
            Err(Error::InvalidScatterDescriptor)
        );
    }

    #[test]
    fn test_apply_read_response_fills_buffer() {
        let mut chunk = vec![MemScatter::new(0x1000, 4096)];
        let mut payload = Vec::new();
        chunk[0].encode_descriptor(&mut payload).unwrap();
        // mark done in the response copy
        payload[MEM_SCATTER_LEN - 4..].copy_from_slice(&1u32.to_ne_bytes());
        payload.extend(vec![0xCCu8; 4096]);

        apply_read_response(&mut chunk, 1, &payload).unwrap();
        assert!(chunk[0].done);
        assert_eq!(chunk[0].buffer, vec![0xCCu8; 4096]);
    }

    #[test]
    fn test_apply_read_response_stops_on_address_mismatch() {
        let mut chunk = vec![MemScatter::new(0x1000, 16), MemScatter::new(0x2000, 16)];
        let mut payload = Vec::new();
        // response descriptor claims a different address than requested
        let mismatched = MemScatter::new(0x9999, 16);
        mismatched.encode_descriptor(&mut payload).unwrap();
        payload.extend(vec![0u8; 32]); // plenty of trailing data

        apply_read_response(&mut chunk, 1, &payload).unwrap();
        assert!(!chunk[0].done);
        assert!(!chunk[1].done);
    }

    #[test]
    fn test_write_round_trip_descriptor_and_data() {
        let mut chunk = vec![MemScatter::new(0x1000, 4)];
        chunk[0].buffer = vec![1, 2, 3, 4];
        let req = build_write_request(&chunk).unwrap();
        assert_eq!(req.len(), MEM_SCATTER_LEN + MEM_SCATTER_PAGE);

        let resp = 1u32.to_ne_bytes().to_vec();
        apply_write_response(&mut chunk, &resp).unwrap();
        assert!(chunk[0].done);
    }

    #[test]
    fn test_write_rejects_oversized_descriptor() {
        let mut chunk = vec![MemScatter::new(0x1000, (MEM_SCATTER_PAGE + 1) as u32)];
        chunk[0].buffer = vec![0u8; MEM_SCATTER_PAGE + 1];
        assert_eq!(
            build_write_request(&chunk),
            Err(Error::InvalidScatterDescriptor)
        );
    }

    #[test]
    fn test_chunks_splits_large_input() {
        let mut descriptors: Vec<MemScatter> = (0..(MEM_SCATTER_CHUNK + 10))
            .map(|i| MemScatter::new(i as u64, 1))
            .collect();
        let chunk_lens: Vec<usize> = chunks(&mut descriptors).map(|c| c.len()).collect();
        assert_eq!(chunk_lens, vec![MEM_SCATTER_CHUNK, 10]);
    }
}
