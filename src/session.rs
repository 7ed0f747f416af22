//! Session lifecycle (Open/Close) and the typed operation wrappers built on
//! top of the request engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use crate::compression::CompressionCodec;
use crate::config::{Config, RemoteUri};
use crate::header::{Header, HEADER_LEN, MAX_LEN_RESPONSE, FLAG_NOCOMPRESS};
use crate::keepalive::KeepAliveHandle;
use crate::message::{BinBody, DataBody, BIN_BODY_FIXED_LEN, DATA_BODY_LEN};
use crate::open::{OpenBody, OPEN_BODY_FIXED_LEN};
use crate::scatter::{self, MemScatter};
use crate::transport::{RemoteTransport, Transport};
use crate::vfs::{self, VfsCommand, VfsResult};
use crate::{Error, ErrorInfo, MessageKind};

/// `fCMD` values recognized as VFS directory listing/read/write commands.
pub const FCMD_AGENT_VFS_LIST: u64 = 0x0000_0001_0000_0000;
/// `fCMD` value for a VFS file read.
pub const FCMD_AGENT_VFS_READ: u64 = 0x0000_0002_0000_0000;
/// `fCMD` value for a VFS file write.
pub const FCMD_AGENT_VFS_WRITE: u64 = 0x0000_0003_0000_0000;

/// The outcome of [`open`]: either a live session, or a failed handshake
/// carrying the optional human-readable reason the remote supplied.
pub enum OpenOutcome {
    /// The handshake succeeded; the session is ready for use.
    Success(Session),
    /// The handshake failed. `Some` when the remote returned a well-formed
    /// error-info blob.
    Failure(Option<ErrorInfo>),
}

struct SessionInner {
    transport: Box<dyn Transport>,
    config: Mutex<Config>,
    client_id: u32,
    compress_enabled: AtomicBool,
    codec: Box<dyn CompressionCodec + Send + Sync>,
    is_rpc: bool,
    closed: AtomicBool,
}

impl SessionInner {
    fn request_flags(&self) -> u32 {
        if self.is_rpc && self.compress_enabled.load(Ordering::SeqCst) {
            0
        } else {
            FLAG_NOCOMPRESS
        }
    }

    fn validate_envelope(&self, buf: &[u8], expected: MessageKind) -> Result<Header, Error> {
        let header = Header::decode(buf)?;

        if header.length as usize != buf.len() {
            warn!(expected = buf.len(), got = header.length, "response length mismatch");
            return Err(Error::IncompleteMessage {
                buffer_len: buf.len(),
                expected: header.length as usize,
            });
        }
        if header.length > MAX_LEN_RESPONSE {
            warn!(length = header.length, "response exceeds maximum length");
            return Err(Error::LengthExceeded {
                length: header.length,
                max: MAX_LEN_RESPONSE,
            });
        }
        if header.kind != expected {
            warn!(?expected, got = ?header.kind, "unexpected response kind");
            return Err(Error::UnexpectedKind {
                wanted: expected,
                got: header.kind,
            });
        }
        if !header.ok {
            warn!(kind = ?header.kind, "server reported failure");
            return Err(Error::ServerFailure);
        }

        Ok(header)
    }

    fn submit_header_only(&self, kind: MessageKind) -> Result<(), Error> {
        let expected = kind
            .expected_response()
            .ok_or_else(|| Error::InvalidMessageKind(kind as u32))?;

        let header = Header::new_request(kind, self.client_id, HEADER_LEN as u32, self.request_flags());
        let mut buf = Vec::new();
        header.encode_into(&mut buf)?;

        let response = self.transport.send_and_receive(&buf).map_err(|e| {
            error!(error = %e, "transport failure");
            e
        })?;

        let resp_header = self.validate_envelope(&response, expected)?;
        if response.len() != HEADER_LEN {
            return Err(Error::BadBodySize {
                kind: resp_header.kind,
                got: response.len(),
                wanted: HEADER_LEN,
            });
        }
        Ok(())
    }

    fn submit_data(&self, kind: MessageKind, qw_data: [u64; 8]) -> Result<DataBody, Error> {
        let expected = kind
            .expected_response()
            .ok_or_else(|| Error::InvalidMessageKind(kind as u32))?;

        let mut req = DataBody::new_request(kind, self.client_id, self.request_flags());
        req.qw_data = qw_data;
        let buf = req.encode()?;

        let response = self.transport.send_and_receive(&buf).map_err(|e| {
            error!(error = %e, "transport failure");
            e
        })?;

        self.validate_envelope(&response, expected)?;
        if response.len() != DATA_BODY_LEN {
            return Err(Error::BadBodySize {
                kind: expected,
                got: response.len(),
                wanted: DATA_BODY_LEN,
            });
        }
        DataBody::decode(&response)
    }

    fn submit_bin(&self, kind: MessageKind, qw_data: [u64; 8], payload: Vec<u8>) -> Result<BinBody, Error> {
        let expected = kind
            .expected_response()
            .ok_or_else(|| Error::InvalidMessageKind(kind as u32))?;

        let mut req = BinBody::new_request(kind, self.client_id, self.request_flags(), payload);
        req.qw_data = qw_data;
        req.compress_in_place(self.codec.as_ref(), !self.compress_enabled.load(Ordering::SeqCst) || !self.is_rpc);
        let buf = req.encode()?;

        let response = self.transport.send_and_receive(&buf).map_err(|e| {
            error!(error = %e, "transport failure");
            e
        })?;

        self.validate_envelope(&response, expected)?;
        if response.len() < BIN_BODY_FIXED_LEN {
            return Err(Error::BadBodySize {
                kind: expected,
                got: response.len(),
                wanted: BIN_BODY_FIXED_LEN,
            });
        }
        let body = BinBody::decode(&response)?;
        body.decompressed(self.codec.as_ref())
    }

    fn submit_keepalive(&self) -> Result<(), Error> {
        self.submit_header_only(MessageKind::KeepAliveReq)
    }
}

/// A live, open session. Every typed operation is a thin wrapper around the
/// request engine in [`SessionInner`].
pub struct Session {
    inner: Arc<SessionInner>,
    keepalive: Mutex<Option<KeepAliveHandle>>,
}

/// Removes the literal prefix `remote` from a device name beginning with
/// `existingremote`, so the remainder reads `existing<suffix>`.
///
/// This mirrors the original client's index-shifted rewrite over the exact
/// substring `remote` starting at byte offset 8 (immediately after
/// `existing`), not a generic prefix strip.
fn rewrite_existingremote(device_name: &mut String) {
    const PREFIX: &str = "existingremote";
    if device_name.len() >= PREFIX.len()
        && device_name[..PREFIX.len()].eq_ignore_ascii_case(PREFIX)
    {
        let rest = device_name[PREFIX.len()..].to_string();
        *device_name = format!("existing{rest}");
    }
}

/// Perform the Open handshake against `config.remote`, using `codec` for
/// payload compression.
pub fn open(
    config: Config,
    codec: Box<dyn CompressionCodec + Send + Sync>,
) -> Result<OpenOutcome, Error> {
    let uri = RemoteUri::parse(&config.remote)?;
    let is_rpc = matches!(uri, RemoteUri::Rpc { .. });
    let transport = RemoteTransport::connect(&uri)?;
    open_with_transport(config, codec, Box::new(transport), is_rpc)
}

/// Perform the Open handshake over an already-constructed `transport`,
/// bypassing remote-descriptor parsing and transport construction.
///
/// This is the seam [`open`] is built on; it exists so the handshake logic
/// itself (liveness probe, compression negotiation, error-info handling)
/// can be driven end-to-end against a [`MockTransport`](crate::transport::mock::MockTransport)
/// in tests, without a real pipe or socket.
pub(crate) fn open_with_transport(
    mut config: Config,
    mut codec: Box<dyn CompressionCodec + Send + Sync>,
    transport: Box<dyn Transport>,
    is_rpc: bool,
) -> Result<OpenOutcome, Error> {
    // Liveness probe; any failure aborts the open.
    let probe_header = Header::new_request(MessageKind::PingReq, 0, HEADER_LEN as u32, 0);
    let mut probe_buf = Vec::new();
    probe_header.encode_into(&mut probe_buf)?;
    let probe_response = transport.send_and_receive(&probe_buf)?;
    let probe_decoded = Header::decode(&probe_response)?;
    if probe_decoded.kind != MessageKind::PingRsp || !probe_decoded.ok {
        return Err(Error::UnexpectedKind {
            wanted: MessageKind::PingRsp,
            got: probe_decoded.kind,
        });
    }

    rewrite_existingremote(&mut config.device_name);

    let codec_ok = codec.initialize();
    let mut compress_desired = is_rpc && codec_ok && !config.remote_disable_compress;

    let client_id = rand::random::<u32>();

    let wire_cfg = config.for_wire();
    let flags = if compress_desired { 0 } else { FLAG_NOCOMPRESS };
    let open_req = OpenBody::new_request(client_id, flags, wire_cfg);
    let req_bytes = open_req.encode()?;
    let resp_bytes = transport.send_and_receive(&req_bytes)?;

    let resp_header = Header::decode(&resp_bytes)?;
    if resp_header.kind != MessageKind::OpenRsp {
        return Err(Error::UnexpectedKind {
            wanted: MessageKind::OpenRsp,
            got: resp_header.kind,
        });
    }
    if resp_bytes.len() < OPEN_BODY_FIXED_LEN {
        return Err(Error::BadBodySize {
            kind: resp_header.kind,
            got: resp_bytes.len(),
            wanted: OPEN_BODY_FIXED_LEN,
        });
    }
    let open_rsp = OpenBody::decode(&resp_bytes)?;

    if !open_rsp.valid_open {
        warn!("remote refused open handshake");
        return Ok(OpenOutcome::Failure(open_rsp.error_info));
    }

    compress_desired = compress_desired && !open_rsp.config.remote_disable_compress;
    config.merge_from_remote(&open_rsp.config);

    let inner = Arc::new(SessionInner {
        transport,
        config: Mutex::new(config),
        client_id,
        compress_enabled: AtomicBool::new(compress_desired),
        codec,
        is_rpc,
        closed: AtomicBool::new(false),
    });

    let keepalive_inner = Arc::clone(&inner);
    let keepalive = KeepAliveHandle::spawn(move || {
        if let Err(e) = keepalive_inner.submit_keepalive() {
            warn!(error = %e, "keepalive request failed");
        }
    });

    Ok(OpenOutcome::Success(Session {
        inner,
        keepalive: Mutex::new(Some(keepalive)),
    }))
}

impl Session {
    /// `true` if concurrent calls from several threads are safe without
    /// external synchronization (RPC transport only).
    pub fn is_multi_thread_safe(&self) -> bool {
        self.inner.is_rpc
    }

    /// Issue an explicit Ping, returning `true` on success.
    pub fn ping(&self) -> bool {
        self.inner.submit_header_only(MessageKind::PingReq).is_ok()
    }

    /// Query a single device option.
    pub fn get_option(&self, key: u64) -> Result<u64, Error> {
        let resp = self
            .inner
            .submit_data(MessageKind::GetOptionReq, [key, 0, 0, 0, 0, 0, 0, 0])?;
        Ok(resp.qw_data[0])
    }

    /// Set a single device option.
    pub fn set_option(&self, key: u64, value: u64) -> bool {
        self.inner
            .submit_data(MessageKind::SetOptionReq, [key, value, 0, 0, 0, 0, 0, 0])
            .is_ok()
    }

    /// Batched memory read: updates `done` and `buffer` on each descriptor
    /// in place.
    pub fn read_scatter(&self, descriptors: &mut [MemScatter]) {
        for chunk in scatter::chunks(descriptors) {
            if let Err(e) = self.read_scatter_chunk(chunk) {
                warn!(error = %e, "read_scatter chunk failed");
            }
        }
    }

    fn read_scatter_chunk(&self, chunk: &mut [MemScatter]) -> Result<(), Error> {
        let (payload, count_valid, total_cb) = scatter::build_read_request(chunk)?;
        let resp = self.inner.submit_bin(
            MessageKind::ReadScatterReq,
            [count_valid as u64, total_cb, 0, 0, 0, 0, 0, 0],
            payload,
        )?;

        if resp.qw_data[0] != count_valid as u64 {
            return Err(Error::InvalidScatterDescriptor);
        }

        scatter::apply_read_response(chunk, count_valid, &resp.payload)
    }

    /// Batched memory write: updates `done` on each descriptor in place.
    pub fn write_scatter(&self, descriptors: &mut [MemScatter]) {
        for chunk in scatter::chunks(descriptors) {
            if let Err(e) = self.write_scatter_chunk(chunk) {
                warn!(error = %e, "write_scatter chunk failed");
            }
        }
    }

    fn write_scatter_chunk(&self, chunk: &mut [MemScatter]) -> Result<(), Error> {
        let payload = scatter::build_write_request(chunk)?;
        let resp = self.inner.submit_bin(
            MessageKind::WriteScatterReq,
            [chunk.len() as u64, 0, 0, 0, 0, 0, 0, 0],
            payload,
        )?;
        scatter::apply_write_response(chunk, &resp.payload)
    }

    /// Invoke an arbitrary agent command, applying VFS structural
    /// validation when `fcmd` is a recognized VFS subtype.
    pub fn command(&self, fcmd: u64, input: Vec<u8>) -> Result<Vec<u8>, Error> {
        let resp = self
            .inner
            .submit_bin(MessageKind::CommandReq, [fcmd, 0, 0, 0, 0, 0, 0, 0], input)?;

        if let Some(vfs_cmd) = VfsCommand::from_fcmd(fcmd) {
            match vfs::verify_vfs(vfs_cmd, &resp.payload)? {
                VfsResult::Plain(_) | VfsResult::List(_) => {}
            }
        }

        Ok(resp.payload)
    }

    /// Close the session. Idempotent: only the first call emits `CloseReq`
    /// and tears anything down.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.keepalive.lock().unwrap().take() {
            handle.stop();
        }

        if let Err(e) = self.inner.submit_header_only(MessageKind::CloseReq) {
            warn!(error = %e, "close request failed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
