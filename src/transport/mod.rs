//! Transport abstraction: a single capability, `send_and_receive`, backed
//! by either an inherited pipe pair or a TCP connection authenticated (or
//! not) with Kerberos.

mod pipe;
mod secure_rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use pipe::Pipe;
pub use secure_rpc::{AuthMode, SecureRpc};

use crate::config::RemoteUri;
use crate::Error;

/// Sends a complete request and returns a complete response, or a
/// transport-level failure.
///
/// Implementations serialize calls internally; at most one request is in
/// flight per transport instance at any moment.
pub trait Transport: Send + Sync {
    /// Write `request` and read back one complete framed response.
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, Error>;
}

/// The two transports a session may use, selected by the scheme of the
/// remote descriptor passed to Open.
pub enum RemoteTransport {
    /// An inherited pipe pair.
    Pipe(Pipe),
    /// A TCP connection, optionally Kerberos-authenticated.
    SecureRpc(SecureRpc),
}

impl RemoteTransport {
    /// Construct the transport selected by `uri`.
    pub fn connect(uri: &RemoteUri) -> Result<Self, Error> {
        match uri {
            RemoteUri::Pipe {
                read_handle,
                write_handle,
            } => Ok(Self::Pipe(Pipe::from_raw_handles(*read_handle, *write_handle)?)),
            RemoteUri::Rpc {
                spn,
                host,
                port,
                nocompress: _,
            } => {
                let auth = match spn {
                    crate::config::SpnMode::Insecure => AuthMode::Insecure,
                    crate::config::SpnMode::Spn(spn) => AuthMode::Kerberos(spn.clone()),
                };
                Ok(Self::SecureRpc(SecureRpc::connect(host, *port, auth)?))
            }
        }
    }

    /// `true` if this transport is safe to drive concurrently from several
    /// threads without external synchronization (see `SPEC_FULL.md` §4.8's
    /// `multiThread` session flag).
    pub fn is_multi_thread_safe(&self) -> bool {
        matches!(self, Self::SecureRpc(_))
    }
}

impl Transport for RemoteTransport {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Self::Pipe(p) => p.send_and_receive(request),
            Self::SecureRpc(s) => s.send_and_receive(request),
        }
    }
}
