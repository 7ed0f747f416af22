#![no_main]
use libfuzzer_sys::fuzz_target;
use memrpc_client::vfs::{verify_vfs, VfsCommand};

// A hostile remote's Command response, for each VFS subtype. Structural
// validation must reject every malformed buffer and never panic or index
// out of bounds, regardless of what bytes a peer sends.
fuzz_target!(|data: &[u8]| {
    let _ = verify_vfs(VfsCommand::List, data);
    let _ = verify_vfs(VfsCommand::Read, data);
    let _ = verify_vfs(VfsCommand::Write, data);
});
