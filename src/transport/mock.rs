//! An in-memory [`Transport`] used only by this crate's own tests, so the
//! request engine, scatter chunker, and session lifecycle can be exercised
//! deterministically without real sockets or pipes.

use std::sync::Mutex;

use crate::Error;

use super::Transport;

/// A canned responder: given a raw request buffer, produce a raw response
/// buffer (or a transport failure).
pub trait Responder: Send {
    /// Handle one request, returning the bytes to hand back to the caller.
    fn respond(&mut self, request: &[u8]) -> Result<Vec<u8>, Error>;
}

impl<F> Responder for F
where
    F: FnMut(&[u8]) -> Result<Vec<u8>, Error> + Send,
{
    fn respond(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        self(request)
    }
}

/// A [`Transport`] whose responses are produced by a caller-supplied
/// [`Responder`], and which records every request it was asked to send for
/// later inspection.
pub struct MockTransport {
    responder: Mutex<Box<dyn Responder>>,
    requests: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    /// Construct a mock transport backed by `responder`.
    pub fn new<R: Responder + 'static>(responder: R) -> Self {
        Self {
            responder: Mutex::new(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of every request sent through this transport so far,
    /// in order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        self.requests.lock().unwrap().push(request.to_vec());
        self.responder.lock().unwrap().respond(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Header, MessageKind, HEADER_LEN};

    #[test]
    fn test_mock_transport_records_requests_and_replays_response() {
        let mock = MockTransport::new(|_req: &[u8]| {
            let rsp = Header::new_request(MessageKind::PingRsp, 7, HEADER_LEN as u32, 0);
            let mut buf = Vec::new();
            rsp.encode_into(&mut buf).unwrap();
            Ok(buf)
        });

        let req = Header::new_request(MessageKind::PingReq, 7, HEADER_LEN as u32, 0);
        let mut req_buf = Vec::new();
        req.encode_into(&mut req_buf).unwrap();

        let response = mock.send_and_receive(&req_buf).unwrap();
        let header = Header::decode(&response).unwrap();
        assert_eq!(header.kind, MessageKind::PingRsp);

        assert_eq!(mock.requests().len(), 1);
        assert_eq!(mock.requests()[0], req_buf);
    }
}
