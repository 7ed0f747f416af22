//! The common message header shared by every request and response on the
//! wire, and the enumeration of message kinds it may carry.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::Error;

/// 32-bit sentinel stamped into every header to reject non-protocol data.
pub const MAGIC: u32 = 0x4D52_5043; // "MRPC", native-endian on the wire.

/// The largest `kind` discriminant currently defined.
pub const MAX_KIND: u32 = MessageKind::CommandRsp as u32;

/// The on-wire size of [`Header`], in bytes.
pub const HEADER_LEN: usize = 24;

/// Upper bound on `length` for any message exchanged over a [`Pipe`]
/// transport.
///
/// [`Pipe`]: crate::transport::Transport::Pipe
pub const MAX_LEN_PIPE: u32 = 16 * 1024 * 1024;

/// Upper bound on `length` enforced by the request engine for any response,
/// regardless of transport.
pub const MAX_LEN_RESPONSE: u32 = 256 * 1024 * 1024;

/// `flags` bit indicating the sender does not want (or did not apply)
/// payload compression to this message.
pub const FLAG_NOCOMPRESS: u32 = 1 << 0;

/// The kind of message carried by a [`Header`].
///
/// This is a stable, wire-visible discriminant; do not renumber existing
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageKind {
    /// Liveness probe sent by the client at Open and on demand.
    PingReq = 0,
    /// Response to [`MessageKind::PingReq`].
    PingRsp = 1,
    /// Graceful session teardown request.
    CloseReq = 2,
    /// Response to [`MessageKind::CloseReq`].
    CloseRsp = 3,
    /// Periodic liveness refresh emitted by the keepalive task.
    KeepAliveReq = 4,
    /// Response to [`MessageKind::KeepAliveReq`].
    KeepAliveRsp = 5,
    /// Session handshake request, carrying the local configuration.
    OpenReq = 6,
    /// Response to [`MessageKind::OpenReq`].
    OpenRsp = 7,
    /// Query a single device option.
    GetOptionReq = 8,
    /// Response to [`MessageKind::GetOptionReq`].
    GetOptionRsp = 9,
    /// Set a single device option.
    SetOptionReq = 10,
    /// Response to [`MessageKind::SetOptionReq`].
    SetOptionRsp = 11,
    /// Batched memory read request.
    ReadScatterReq = 12,
    /// Response to [`MessageKind::ReadScatterReq`].
    ReadScatterRsp = 13,
    /// Batched memory write request.
    WriteScatterReq = 14,
    /// Response to [`MessageKind::WriteScatterReq`].
    WriteScatterRsp = 15,
    /// Arbitrary agent command invocation.
    CommandReq = 16,
    /// Response to [`MessageKind::CommandReq`].
    CommandRsp = 17,
}

impl MessageKind {
    /// Construct a [`MessageKind`] from its wire discriminant, rejecting any
    /// value outside the defined enumeration.
    pub fn from_u32(v: u32) -> Result<Self, Error> {
        use MessageKind::*;
        Ok(match v {
            0 => PingReq,
            1 => PingRsp,
            2 => CloseReq,
            3 => CloseRsp,
            4 => KeepAliveReq,
            5 => KeepAliveRsp,
            6 => OpenReq,
            7 => OpenRsp,
            8 => GetOptionReq,
            9 => GetOptionRsp,
            10 => SetOptionReq,
            11 => SetOptionRsp,
            12 => ReadScatterReq,
            13 => ReadScatterRsp,
            14 => WriteScatterReq,
            15 => WriteScatterRsp,
            16 => CommandReq,
            17 => CommandRsp,
            v => return Err(Error::InvalidMessageKind(v)),
        })
    }

    /// Returns the response kind expected for this request kind, or `None`
    /// if `self` is itself a response kind.
    pub fn expected_response(self) -> Option<Self> {
        use MessageKind::*;
        Some(match self {
            PingReq => PingRsp,
            CloseReq => CloseRsp,
            KeepAliveReq => KeepAliveRsp,
            OpenReq => OpenRsp,
            GetOptionReq => GetOptionRsp,
            SetOptionReq => SetOptionRsp,
            ReadScatterReq => ReadScatterRsp,
            WriteScatterReq => WriteScatterRsp,
            CommandReq => CommandRsp,
            _ => return None,
        })
    }
}

/// The fixed-size prefix common to every message on the wire.
///
/// Fields are written in the native byte order of both peers: this protocol
/// is point-to-point between trusted same-endian hosts, not a network byte
/// order wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Constant [`MAGIC`] sentinel.
    pub magic: u32,
    /// The [`MessageKind`] of this message.
    pub kind: MessageKind,
    /// Total size of this message in bytes, including the header.
    pub length: u32,
    /// Per-session random identifier, echoed by the server.
    pub client_id: u32,
    /// Bit set of `FLAG_*` values.
    pub flags: u32,
    /// `false` on a response indicates the message is a failure report.
    pub ok: bool,
}

impl Header {
    /// Construct a request header for `kind`, owned by session `client_id`,
    /// with the given total `length` and `flags`.
    pub fn new_request(kind: MessageKind, client_id: u32, length: u32, flags: u32) -> Self {
        Self {
            magic: MAGIC,
            kind,
            length,
            client_id,
            flags,
            ok: true,
        }
    }

    /// Parses a [`Header`] from the front of `buf`.
    ///
    /// `buf` must contain at least [`HEADER_LEN`] bytes; trailing bytes are
    /// ignored. The `magic` and the `kind` discriminant are validated; the
    /// `length` value is *not* checked against `buf.len()` here, since the
    /// caller may be parsing only the fixed prefix ahead of reading the rest
    /// of a framed message from a stream.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::IncompleteHeader {
                buffer_len: buf.len(),
            });
        }

        let mut c = Cursor::new(buf);
        let magic = c.read_u32::<NativeEndian>()?;
        if magic != MAGIC {
            return Err(Error::BadMagic { got: magic });
        }

        let kind = MessageKind::from_u32(c.read_u32::<NativeEndian>()?)?;
        let length = c.read_u32::<NativeEndian>()?;
        let client_id = c.read_u32::<NativeEndian>()?;
        let flags = c.read_u32::<NativeEndian>()?;
        let ok = c.read_u32::<NativeEndian>()? != 0;

        Ok(Self {
            magic,
            kind,
            length,
            client_id,
            flags,
            ok,
        })
    }

    /// Serialises this header into `buf`, writing exactly [`HEADER_LEN`]
    /// bytes.
    pub fn encode_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        buf.write_u32::<NativeEndian>(self.magic)?;
        buf.write_u32::<NativeEndian>(self.kind as u32)?;
        buf.write_u32::<NativeEndian>(self.length)?;
        buf.write_u32::<NativeEndian>(self.client_id)?;
        buf.write_u32::<NativeEndian>(self.flags)?;
        buf.write_u32::<NativeEndian>(self.ok as u32)
    }
}
