//! The `pipe://` transport: a read handle and a write handle inherited from
//! the parent process, framed with the common [`Header`].

use std::io::{Read, Write};
use std::sync::Mutex;

use crate::header::{Header, HEADER_LEN, MAX_LEN_PIPE};
use crate::Error;

use super::Transport;

struct PipeIo {
    read: Box<dyn Read + Send>,
    write: Box<dyn Write + Send>,
}

/// A paired read/write handle transport with an exclusive, per-instance
/// lock guaranteeing that no two callers interleave bytes on the same
/// pipe.
pub struct Pipe {
    io: Mutex<PipeIo>,
}

impl Pipe {
    /// Construct a `Pipe` from the two numeric handle values carried by a
    /// `pipe://READ:WRITE` remote descriptor.
    ///
    /// On Unix these are interpreted as raw file descriptors already owned
    /// by this process (duplicated so each end can be closed
    /// independently). There is no non-Unix implementation: like the
    /// original LeechCore client this transport only exists on platforms
    /// where a parent process can hand down inherited pipe descriptors.
    #[cfg(unix)]
    pub fn from_raw_handles(read_handle: u64, write_handle: u64) -> Result<Self, Error> {
        use std::os::unix::io::{FromRawFd, RawFd};

        let read_fd = read_handle as RawFd;
        let write_fd = write_handle as RawFd;

        // SAFETY: the caller (Open) guarantees these descriptors were
        // inherited from the parent process and are not otherwise owned.
        let read = unsafe { std::fs::File::from_raw_fd(read_fd) };
        let write = unsafe { std::fs::File::from_raw_fd(write_fd) };

        Ok(Self {
            io: Mutex::new(PipeIo {
                read: Box::new(read),
                write: Box::new(write),
            }),
        })
    }

    #[cfg(not(unix))]
    pub fn from_raw_handles(_read_handle: u64, _write_handle: u64) -> Result<Self, Error> {
        Err(Error::Transport(
            "pipe transport is not implemented on this platform".into(),
        ))
    }
}

impl Transport for Pipe {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let mut io = self
            .io
            .lock()
            .map_err(|_| Error::Transport("pipe lock poisoned".into()))?;

        io.write.write_all(request)?;

        let mut header_buf = [0u8; HEADER_LEN];
        io.read.read_exact(&mut header_buf)?;
        let header = Header::decode(&header_buf)?;

        if header.length > MAX_LEN_PIPE {
            return Err(Error::LengthExceeded {
                length: header.length,
                max: MAX_LEN_PIPE,
            });
        }
        if (header.length as usize) < HEADER_LEN {
            return Err(Error::IncompleteMessage {
                buffer_len: HEADER_LEN,
                expected: header.length as usize,
            });
        }

        let mut buf = Vec::with_capacity(header.length as usize);
        buf.extend_from_slice(&header_buf);
        let remaining = header.length as usize - HEADER_LEN;
        buf.resize(HEADER_LEN + remaining, 0);
        io.read.read_exact(&mut buf[HEADER_LEN..])?;

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MessageKind;

    #[test]
    fn test_send_and_receive_round_trip() {
        use std::os::unix::io::IntoRawFd;
        use std::os::unix::net::UnixStream;

        // Two unidirectional channels built out of socket pairs: one
        // carries client -> server bytes, the other server -> client.
        let (c2s_client, c2s_server) = UnixStream::pair().unwrap();
        let (sc_server, sc_client) = UnixStream::pair().unwrap();

        let client_write_fd = c2s_client.into_raw_fd();
        let client_read_fd = sc_client.into_raw_fd();
        let server_read_fd = c2s_server.into_raw_fd();
        let server_write_fd = sc_server.into_raw_fd();

        let pipe = Pipe::from_raw_handles(client_read_fd as u64, client_write_fd as u64).unwrap();

        // A thread standing in for the remote peer: consume the request and
        // reply with a minimal PingRsp header.
        let handle = std::thread::spawn(move || {
            use std::os::unix::io::FromRawFd;
            let mut read = unsafe { std::fs::File::from_raw_fd(server_read_fd) };
            let mut write = unsafe { std::fs::File::from_raw_fd(server_write_fd) };
            let mut req_header = [0u8; HEADER_LEN];
            read.read_exact(&mut req_header).unwrap();

            let rsp = Header {
                magic: crate::header::MAGIC,
                kind: MessageKind::PingRsp,
                length: HEADER_LEN as u32,
                client_id: 0x42,
                flags: 0,
                ok: true,
            };
            let mut buf = Vec::new();
            rsp.encode_into(&mut buf).unwrap();
            write.write_all(&buf).unwrap();
        });

        let req = Header::new_request(MessageKind::PingReq, 0x42, HEADER_LEN as u32, 0);
        let mut req_buf = Vec::new();
        req.encode_into(&mut req_buf).unwrap();

        let response = pipe.send_and_receive(&req_buf).unwrap();
        handle.join().unwrap();

        let header = Header::decode(&response).unwrap();
        assert_eq!(header.kind, MessageKind::PingRsp);
        assert_eq!(header.client_id, 0x42);
    }
}
