//! The Open handshake message: a [`Header`] extended with an embedded
//! [`Config`] record, a validity flag, and an optional trailing
//! [`ErrorInfo`] blob present only when the handshake failed.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

use crate::config::{Config, CONFIG_LEN};
use crate::header::{Header, MessageKind, HEADER_LEN};
use crate::{Error, ErrorInfo};

/// On-wire size of an [`OpenBody`] excluding any trailing error-info blob.
pub const OPEN_BODY_FIXED_LEN: usize = HEADER_LEN + CONFIG_LEN + 4;

/// The Open request/response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenBody {
    /// The common header.
    pub header: Header,
    /// The configuration record being exchanged.
    pub config: Config,
    /// On a response, `false` indicates the remote refused the handshake;
    /// on a request this is always `true`.
    pub valid_open: bool,
    /// Present only when `valid_open` is `false`.
    pub error_info: Option<ErrorInfo>,
}

impl OpenBody {
    /// Construct an `OpenReq` carrying `config` (already prepared for the
    /// wire via [`Config::for_wire`]).
    pub fn new_request(client_id: u32, flags: u32, config: Config) -> Self {
        Self {
            header: Header::new_request(
                MessageKind::OpenReq,
                client_id,
                OPEN_BODY_FIXED_LEN as u32,
                flags,
            ),
            config,
            valid_open: true,
            error_info: None,
        }
    }

    /// Construct an `OpenRsp` reporting success.
    pub fn new_success_response(client_id: u32, flags: u32, config: Config) -> Self {
        Self {
            header: Header {
                kind: MessageKind::OpenRsp,
                length: OPEN_BODY_FIXED_LEN as u32,
                ok: true,
                ..Header::new_request(MessageKind::OpenRsp, client_id, 0, flags)
            },
            config,
            valid_open: true,
            error_info: None,
        }
    }

    /// Construct an `OpenRsp` reporting failure, carrying `error_info`.
    pub fn new_failure_response(client_id: u32, flags: u32, config: Config, error_info: ErrorInfo) -> Self {
        let length = OPEN_BODY_FIXED_LEN as u32 + error_info.wire_len();
        Self {
            header: Header {
                kind: MessageKind::OpenRsp,
                length,
                ok: false,
                ..Header::new_request(MessageKind::OpenRsp, client_id, 0, flags)
            },
            config,
            valid_open: false,
            error_info: Some(error_info),
        }
    }

    /// Serialise this body to a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let error_info_len = self.error_info.as_ref().map_or(0, |e| e.wire_len() as usize);
        let mut buf = Vec::with_capacity(OPEN_BODY_FIXED_LEN + error_info_len);
        self.header.encode_into(&mut buf)?;
        buf.write_all(&self.config.encode()?)?;
        buf.write_u32::<NativeEndian>(self.valid_open as u32)?;
        if let Some(info) = &self.error_info {
            buf.write_all(&info.encode()?)?;
        }
        Ok(buf)
    }

    /// Parse an `OpenBody` from a buffer whose header has already been
    /// validated by the caller.
    ///
    /// A trailing error-info blob, if present, is structurally validated
    /// here: its absence is only tolerated when `valid_open` is `true`.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let header = Header::decode(buf)?;
        if buf.len() < OPEN_BODY_FIXED_LEN {
            return Err(Error::BadBodySize {
                kind: header.kind,
                got: buf.len(),
                wanted: OPEN_BODY_FIXED_LEN,
            });
        }

        let (config_version, config) = Config::decode(&buf[HEADER_LEN..])?;
        if config_version != crate::config::CONFIG_VERSION {
            return Err(Error::InvalidErrorInfo);
        }

        let valid_open_off = HEADER_LEN + CONFIG_LEN;
        let valid_open =
            (&buf[valid_open_off..valid_open_off + 4]).read_u32::<NativeEndian>()? != 0;

        let trailing = &buf[OPEN_BODY_FIXED_LEN..];
        let error_info = if valid_open {
            if !trailing.is_empty() {
                return Err(Error::BadBodySize {
                    kind: header.kind,
                    got: buf.len(),
                    wanted: OPEN_BODY_FIXED_LEN,
                });
            }
            None
        } else if trailing.is_empty() {
            None
        } else {
            Some(ErrorInfo::decode(trailing)?)
        };

        Ok(Self {
            header,
            config,
            valid_open,
            error_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_body_success_round_trip() {
        let cfg = Config::new("rpc", "");
        let b = OpenBody::new_success_response(0xaa, 0, cfg);
        let buf = b.encode().unwrap();
        assert_eq!(buf.len(), OPEN_BODY_FIXED_LEN);

        let got = OpenBody::decode(&buf).unwrap();
        assert_eq!(got, b);
        assert!(got.error_info.is_none());
    }

    #[test]
    fn test_open_body_failure_round_trip() {
        let cfg = Config::new("rpc", "");
        let info = ErrorInfo::new("authentication refused");
        let b = OpenBody::new_failure_response(0xaa, 0, cfg, info);
        let buf = b.encode().unwrap();

        let got = OpenBody::decode(&buf).unwrap();
        assert_eq!(got, b);
        assert!(!got.valid_open);
        assert_eq!(got.error_info.unwrap().user_text, "authentication refused");
    }

    #[test]
    fn test_open_body_request_round_trip() {
        let mut cfg = Config::new("rpc", "rpc://insecure:127.0.0.1");
        let wire_cfg = cfg.for_wire();
        cfg.logger_installed = true; // local-only, never on the wire

        let b = OpenBody::new_request(0x1, 0, wire_cfg);
        let buf = b.encode().unwrap();
        let got = OpenBody::decode(&buf).unwrap();
        assert_eq!(got, b);
        assert_eq!(got.config.remote, "");
    }

    #[test]
    fn test_open_body_rejects_trailing_bytes_when_valid() {
        let cfg = Config::new("rpc", "");
        let b = OpenBody::new_success_response(0xaa, 0, cfg);
        let mut buf = b.encode().unwrap();
        buf.push(0);
        buf[8..12].copy_from_slice(&(buf.len() as u32 - 1).to_ne_bytes());
        assert!(matches!(
            OpenBody::decode(&buf),
            Err(Error::BadBodySize { .. })
        ));
    }
}
