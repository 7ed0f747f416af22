//! The `rpc://` transport: a TCP connection, optionally authenticated
//! against a Kerberos service principal name.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use crate::header::{Header, HEADER_LEN, MAX_LEN_RESPONSE};
use crate::Error;

use super::Transport;

/// How the connection authenticates itself to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No authentication: an anonymous, unencrypted bind. Selected by
    /// supplying `insecure` as the SPN field of an `rpc://` descriptor.
    Insecure,
    /// Mutual-auth, packet-privacy Kerberos against the given service
    /// principal name.
    Kerberos(String),
}

/// A TCP-backed transport. The RPC runtime this stands in for is assumed
/// thread-safe by the original design; this implementation serializes
/// access with a plain `Mutex` rather than depending on unavailable
/// platform RPC/SSPI machinery.
pub struct SecureRpc {
    stream: Mutex<TcpStream>,
}

impl SecureRpc {
    /// Connect to `host:port`, applying `auth`.
    ///
    /// Kerberos authentication is not implemented in this build (no
    /// GSSAPI/SSPI binding is available in the dependency stack); a
    /// non-insecure `AuthMode` always fails here, mirroring the upstream
    /// non-Windows build which stubs out the secure RPC path entirely.
    pub fn connect(host: &str, port: u16, auth: AuthMode) -> Result<Self, Error> {
        if !matches!(auth, AuthMode::Insecure) {
            return Err(Error::Transport(
                "kerberos authentication is not available in this build; retry with SPN 'insecure' if the server allows it".into(),
            ));
        }

        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

impl Transport for SecureRpc {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| Error::Transport("rpc connection lock poisoned".into()))?;

        stream.write_all(request)?;

        let mut header_buf = [0u8; HEADER_LEN];
        stream.read_exact(&mut header_buf)?;
        let header = Header::decode(&header_buf)?;

        if header.length > MAX_LEN_RESPONSE {
            return Err(Error::LengthExceeded {
                length: header.length,
                max: MAX_LEN_RESPONSE,
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
        stream.read_exact(&mut buf[HEADER_LEN..])?;

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_kerberos_auth() {
        let err = SecureRpc::connect("127.0.0.1", 1, AuthMode::Kerberos("HOST/svc".into()));
        assert!(matches!(err, Err(Error::Transport(_))));
    }

    #[test]
    fn test_send_and_receive_round_trip() {
        use crate::header::MessageKind;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut req_header = [0u8; HEADER_LEN];
            stream.read_exact(&mut req_header).unwrap();

            let rsp = Header {
                magic: crate::header::MAGIC,
                kind: MessageKind::PingRsp,
                length: HEADER_LEN as u32,
                client_id: 0x99,
                flags: 0,
                ok: true,
            };
            let mut buf = Vec::new();
            rsp.encode_into(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let rpc = SecureRpc::connect(&addr.ip().to_string(), addr.port(), AuthMode::Insecure)
            .unwrap();

        let req = Header::new_request(MessageKind::PingReq, 0x99, HEADER_LEN as u32, 0);
        let mut req_buf = Vec::new();
        req.encode_into(&mut req_buf).unwrap();

        let response = rpc.send_and_receive(&req_buf).unwrap();
        server.join().unwrap();

        let header = Header::decode(&response).unwrap();
        assert_eq!(header.kind, MessageKind::PingRsp);
        assert_eq!(header.client_id, 0x99);
    }
}
