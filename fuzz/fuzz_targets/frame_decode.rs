#![no_main]
use libfuzzer_sys::fuzz_target;
use memrpc_client::header::Header;
use memrpc_client::message::{BinBody, DataBody};

// The request engine never trusts a response buffer's length or contents;
// decoding arbitrary bytes must only ever return an error, never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(header) = Header::decode(data) {
        match header.kind {
            memrpc_client::header::MessageKind::GetOptionReq
            | memrpc_client::header::MessageKind::GetOptionRsp
            | memrpc_client::header::MessageKind::SetOptionReq
            | memrpc_client::header::MessageKind::SetOptionRsp => {
                let _ = DataBody::decode(data);
            }
            memrpc_client::header::MessageKind::ReadScatterReq
            | memrpc_client::header::MessageKind::ReadScatterRsp
            | memrpc_client::header::MessageKind::WriteScatterReq
            | memrpc_client::header::MessageKind::WriteScatterRsp
            | memrpc_client::header::MessageKind::CommandReq
            | memrpc_client::header::MessageKind::CommandRsp => {
                let _ = BinBody::decode(data);
            }
            _ => {}
        }
    }
});
