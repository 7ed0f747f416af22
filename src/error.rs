//! The crate's single error type, covering every failure class in
//! `SPEC_FULL.md` §7: framing, protocol, validation, transport, resource,
//! and configuration errors.

use thiserror::Error;

/// Error types returned by this crate.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    // --- Framing errors ---------------------------------------------------
    /// The buffer is too small to contain a [`Header`](crate::Header).
    #[error("incomplete header (got {buffer_len} bytes, expected {})", crate::header::HEADER_LEN)]
    IncompleteHeader {
        /// The length of the buffer provided.
        buffer_len: usize,
    },

    /// The header `magic` field did not match [`MAGIC`](crate::header::MAGIC).
    #[error("bad magic: {got:#010x}")]
    BadMagic {
        /// The value actually present in the header.
        got: u32,
    },

    /// The message is shorter than its header `length` field promises, or
    /// longer (the transport delivered extra trailing bytes).
    #[error("incomplete message (got {buffer_len} bytes, expected {expected})")]
    IncompleteMessage {
        /// Bytes actually read from the transport.
        buffer_len: usize,
        /// Bytes the header `length` field promised.
        expected: usize,
    },

    /// The header `length` exceeds the bound for the transport or message
    /// direction in use.
    #[error("message length {length} exceeds maximum {max}")]
    LengthExceeded {
        /// The length claimed by the header.
        length: u32,
        /// The maximum permitted for this context.
        max: u32,
    },

    // --- Protocol errors ----------------------------------------------------
    /// The header `kind` discriminant is not one of [`MessageKind`](crate::MessageKind).
    #[error("invalid message kind {0}")]
    InvalidMessageKind(u32),

    /// A response was received with a `kind` other than the one expected for
    /// the request that was sent.
    #[error("unexpected response kind: wanted {wanted:?}, got {got:?}")]
    UnexpectedKind {
        /// The kind the request engine expected.
        wanted: crate::MessageKind,
        /// The kind actually present in the response.
        got: crate::MessageKind,
    },

    /// The response's `ok` bit was `false`: the server reported a failure.
    #[error("server reported failure")]
    ServerFailure,

    /// The response body size does not match what its `kind` requires.
    #[error("bad body size for {kind:?}: got {got}, wanted {wanted}")]
    BadBodySize {
        /// The response kind whose size contract was violated.
        kind: crate::MessageKind,
        /// The size actually observed.
        got: usize,
        /// The size (or minimum size) required.
        wanted: usize,
    },

    // --- Validation errors ---------------------------------------------------
    /// A scatter descriptor failed structural validation (bad version, or
    /// length over the page size bound).
    #[error("invalid scatter descriptor")]
    InvalidScatterDescriptor,

    /// The remote's VFS command response failed structural validation.
    #[error("untrusted vfs response failed validation")]
    InvalidVfsResponse,

    /// The remote's error-info blob (returned on a failed Open) failed
    /// structural validation.
    #[error("invalid error-info blob")]
    InvalidErrorInfo,

    // --- Transport errors ----------------------------------------------------
    /// The transport could not complete the request/response exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote compression codec failed to decode a payload whose
    /// `cbDecompressed` field indicated it was compressed.
    #[error("decompression failed")]
    Decompression,

    // --- Configuration errors -------------------------------------------------
    /// The remote descriptor string did not match either supported URI
    /// grammar, or a required field was missing/malformed.
    #[error("invalid remote descriptor: {0}")]
    InvalidRemoteUri(String),

    /// An I/O error occurred while using a transport.
    #[error("i/o error ({0:?}): {1}")]
    IOError(std::io::ErrorKind, String),
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::IOError(v.kind(), v.to_string())
    }
}
