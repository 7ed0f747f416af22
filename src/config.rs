//! The configuration record exchanged during Open, its on-wire encoding, the
//! error-info blob returned on a failed Open, and parsing for the two
//! supported remote-descriptor URI grammars.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::Error;

/// Current wire version of [`Config`].
pub const CONFIG_VERSION: u32 = 1;

const DEVICE_NAME_LEN: usize = 260;
const REMOTE_LEN: usize = 260;

/// On-wire size of [`Config`].
pub(crate) const CONFIG_LEN: usize = 4 + DEVICE_NAME_LEN + REMOTE_LEN + 4 + 4;

/// Default TCP port used by the `rpc://` transport when no `port=` option is
/// given.
pub const DEFAULT_RPC_PORT: u16 = 28473;

/// The configuration record mirrored between the local process and the
/// remote service at Open.
///
/// The `logger_installed` field stands in for the printf-style callback
/// slot described in `SPEC_FULL.md` §6: rather than carrying a function
/// pointer across the wire (which would be meaningless to the remote
/// process), only a flag recording whether a local `tracing` subscriber is
/// active crosses the FFI-like boundary, and it is always cleared before
/// transmission and restored from the local copy afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The bare device name, e.g. `"rpc"`, `"pipe"`, or (after the
    /// `existingremote` rewrite) an arbitrary existing-device identifier.
    pub device_name: String,
    /// The original remote descriptor string the caller supplied to Open.
    pub remote: String,
    /// `true` if the local side refuses to use payload compression.
    pub remote_disable_compress: bool,
    /// Whether a local logging subscriber is installed. Never meaningful on
    /// the wire; always cleared before Open is sent.
    pub logger_installed: bool,
}

impl Config {
    /// Construct a new configuration for `device_name` and `remote`, with
    /// compression enabled and no logger installed.
    pub fn new(device_name: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            remote: remote.into(),
            remote_disable_compress: false,
            logger_installed: false,
        }
    }

    /// Returns a copy of `self` with the remote descriptor cleared and the
    /// logger flag cleared, ready to be embedded in an outbound `OpenReq`
    /// (see `SPEC_FULL.md` §4.8: "a copy of the local configuration record
    /// with the remote-descriptor field cleared and any callback slots
    /// zeroed").
    pub fn for_wire(&self) -> Self {
        Self {
            device_name: self.device_name.clone(),
            remote: String::new(),
            remote_disable_compress: self.remote_disable_compress,
            logger_installed: false,
        }
    }

    /// Merge `remote`'s fields into `self`, preserving `self.remote` and
    /// `self.logger_installed` (the locally-preserved slots described in
    /// `SPEC_FULL.md` §4.8).
    pub fn merge_from_remote(&mut self, remote_cfg: &Config) {
        let preserved_remote = std::mem::take(&mut self.remote);
        let preserved_logger = self.logger_installed;
        *self = remote_cfg.clone();
        self.remote = preserved_remote;
        self.logger_installed = preserved_logger;
    }

    fn encode_fixed_str(buf: &mut Vec<u8>, s: &str, len: usize) -> Result<(), std::io::Error> {
        let bytes = s.as_bytes();
        let n = bytes.len().min(len - 1);
        buf.write_all(&bytes[..n])?;
        buf.write_all(&vec![0u8; len - n])?;
        Ok(())
    }

    fn decode_fixed_str(buf: &[u8]) -> String {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..end]).into_owned()
    }

    /// Serialise this configuration to a freshly allocated, fixed-size
    /// buffer of exactly [`CONFIG_LEN`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Vec::with_capacity(CONFIG_LEN);
        buf.write_u32::<NativeEndian>(CONFIG_VERSION)?;
        Self::encode_fixed_str(&mut buf, &self.device_name, DEVICE_NAME_LEN)?;
        Self::encode_fixed_str(&mut buf, &self.remote, REMOTE_LEN)?;
        buf.write_u32::<NativeEndian>(self.remote_disable_compress as u32)?;
        buf.write_u32::<NativeEndian>(self.logger_installed as u32)?;
        Ok(buf)
    }

    /// Parse a `Config` from `buf`, which must contain at least
    /// [`CONFIG_LEN`] bytes. Returns the version actually present alongside
    /// the parsed value so the caller can reject a version mismatch per
    /// `SPEC_FULL.md` §4.8.
    pub fn decode(buf: &[u8]) -> Result<(u32, Self), Error> {
        if buf.len() < CONFIG_LEN {
            return Err(Error::InvalidErrorInfo);
        }
        let mut c = Cursor::new(buf);
        let version = c.read_u32::<NativeEndian>()?;

        let pos = c.position() as usize;
        let device_name = Self::decode_fixed_str(&buf[pos..pos + DEVICE_NAME_LEN]);
        let pos = pos + DEVICE_NAME_LEN;
        let remote = Self::decode_fixed_str(&buf[pos..pos + REMOTE_LEN]);
        let pos = pos + REMOTE_LEN;

        let mut c = Cursor::new(&buf[pos..]);
        let remote_disable_compress = c.read_u32::<NativeEndian>()? != 0;
        let logger_installed = c.read_u32::<NativeEndian>()? != 0;

        Ok((
            version,
            Self {
                device_name,
                remote,
                remote_disable_compress,
                logger_installed,
            },
        ))
    }
}

/// Current wire version of [`ErrorInfo`].
pub const ERRORINFO_VERSION: u32 = 1;

const ERRORINFO_HEADER_LEN: usize = 4 + 4 + 4;

/// Structural detail returned by a failed Open: a counted, NUL-terminated
/// UTF-16 message for display to a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Number of UTF-16 code units in `user_text`, excluding the trailing
    /// NUL that is always present on the wire.
    pub user_text_len: u32,
    /// The human-readable message.
    pub user_text: String,
}

impl ErrorInfo {
    /// Construct a new `ErrorInfo` wrapping `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let user_text_len = text.encode_utf16().count() as u32;
        Self {
            user_text_len,
            user_text: text,
        }
    }

    /// On-wire size of this blob, including its header and trailing NUL.
    pub fn wire_len(&self) -> u32 {
        ERRORINFO_HEADER_LEN as u32 + (self.user_text_len + 1) * 2
    }

    /// Serialise this blob to a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Vec::with_capacity(self.wire_len() as usize);
        buf.write_u32::<NativeEndian>(ERRORINFO_VERSION)?;
        buf.write_u32::<NativeEndian>(self.wire_len())?;
        buf.write_u32::<NativeEndian>(self.user_text_len)?;
        for unit in self.user_text.encode_utf16() {
            buf.write_u16::<NativeEndian>(unit)?;
        }
        buf.write_u16::<NativeEndian>(0)?; // trailing NUL
        Ok(buf)
    }

    /// Parse and structurally validate an `ErrorInfo` blob from `buf`.
    ///
    /// Per `SPEC_FULL.md` §4.8, this rejects any blob whose version, struct
    /// length, or text length/buffer size are inconsistent, rather than
    /// trusting the untrusted remote peer.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < ERRORINFO_HEADER_LEN {
            return Err(Error::InvalidErrorInfo);
        }
        let mut c = Cursor::new(buf);
        let version = c.read_u32::<NativeEndian>()?;
        if version != ERRORINFO_VERSION {
            return Err(Error::InvalidErrorInfo);
        }
        let cb_struct = c.read_u32::<NativeEndian>()?;
        let user_text_len = c.read_u32::<NativeEndian>()?;

        let wanted_len = ERRORINFO_HEADER_LEN as u64 + (user_text_len as u64 + 1) * 2;
        if cb_struct as u64 != wanted_len || buf.len() as u64 != wanted_len {
            return Err(Error::InvalidErrorInfo);
        }

        let mut units = Vec::with_capacity(user_text_len as usize);
        for _ in 0..user_text_len {
            units.push(c.read_u16::<NativeEndian>()?);
        }
        let terminator = c.read_u16::<NativeEndian>()?;
        if terminator != 0 {
            return Err(Error::InvalidErrorInfo);
        }

        let user_text = String::from_utf16(&units).map_err(|_| Error::InvalidErrorInfo)?;

        Ok(Self {
            user_text_len,
            user_text,
        })
    }
}

/// Whether the `rpc://` transport authenticates the connection or binds
/// anonymously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpnMode {
    /// The caller opted out of authentication by specifying `insecure`.
    Insecure,
    /// Authenticate using this Kerberos service principal name.
    Spn(String),
}

/// A parsed remote descriptor, selecting and configuring a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUri {
    /// `rpc://<spn>:<host>[:<opts>]`
    Rpc {
        /// Authentication mode selected by the first field.
        spn: SpnMode,
        /// The TCP host to connect to.
        host: String,
        /// The TCP port to connect to.
        port: u16,
        /// `true` if the `nocompress` option was present.
        nocompress: bool,
    },
    /// `pipe://<read_handle>:<write_handle>`
    Pipe {
        /// The inherited read-end handle value.
        read_handle: u64,
        /// The inherited write-end handle value.
        write_handle: u64,
    },
}

impl RemoteUri {
    /// Parse a remote descriptor string per the grammar in `SPEC_FULL.md`
    /// §6.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if let Some(rest) = s.strip_prefix("rpc://") {
            return Self::parse_rpc(rest);
        }
        if let Some(rest) = s.strip_prefix("pipe://") {
            return Self::parse_pipe(rest);
        }
        Err(Error::InvalidRemoteUri(format!(
            "unrecognised remote descriptor: {s}"
        )))
    }

    fn parse_rpc(rest: &str) -> Result<Self, Error> {
        let mut parts = rest.splitn(3, ':');
        let spn_field = parts.next().unwrap_or("");
        let host = parts.next().unwrap_or("");
        let opts_field = parts.next().unwrap_or("");

        if spn_field.is_empty() || host.is_empty() {
            return Err(Error::InvalidRemoteUri(
                "rpc:// requires an SPN and a host".into(),
            ));
        }

        let spn = if spn_field.eq_ignore_ascii_case("insecure") {
            SpnMode::Insecure
        } else {
            SpnMode::Spn(spn_field.to_string())
        };

        let mut port = 0u16;
        let mut nocompress = false;
        if !opts_field.is_empty() {
            for opt in opts_field.splitn(3, ',') {
                if opt.eq_ignore_ascii_case("nocompress") {
                    nocompress = true;
                } else if let Some(v) = opt
                    .get(..5)
                    .filter(|p| p.eq_ignore_ascii_case("port="))
                {
                    let _ = v;
                    port = opt[5..]
                        .parse()
                        .map_err(|_| Error::InvalidRemoteUri(format!("bad port option: {opt}")))?;
                }
            }
        }
        if port == 0 {
            port = DEFAULT_RPC_PORT;
        }

        Ok(RemoteUri::Rpc {
            spn,
            host: host.to_string(),
            port,
            nocompress,
        })
    }

    fn parse_pipe(rest: &str) -> Result<Self, Error> {
        let mut parts = rest.splitn(2, ':');
        let read_field = parts.next().unwrap_or("");
        let write_field = parts.next().unwrap_or("");

        let read_handle = read_field
            .parse()
            .map_err(|_| Error::InvalidRemoteUri(format!("bad read handle: {read_field}")))?;
        let write_handle = write_field
            .parse()
            .map_err(|_| Error::InvalidRemoteUri(format!("bad write handle: {write_field}")))?;

        if read_handle == 0 || write_handle == 0 {
            return Err(Error::InvalidRemoteUri(
                "pipe:// handles must be non-zero".into(),
            ));
        }

        Ok(RemoteUri::Pipe {
            read_handle,
            write_handle,
        })
    }
}
