use criterion::{black_box, criterion_group, criterion_main, Criterion};

use memrpc_client::header::{Header, MessageKind, HEADER_LEN};
use memrpc_client::message::{BinBody, DataBody};
use memrpc_client::vfs::{self, VfsCommand};

pub fn header(c: &mut Criterion) {
    c.bench_function("header_encode", |b| {
        let h = Header::new_request(MessageKind::ReadScatterReq, 0x1234_5678, HEADER_LEN as u32, 0);
        b.iter(|| {
            let mut buf = Vec::new();
            h.encode_into(&mut buf).unwrap();
            black_box(buf)
        })
    });

    c.bench_function("header_decode", |b| {
        let h = Header::new_request(MessageKind::ReadScatterReq, 0x1234_5678, HEADER_LEN as u32, 0);
        let mut buf = Vec::new();
        h.encode_into(&mut buf).unwrap();

        b.iter(|| black_box(Header::decode(&buf).unwrap()))
    });
}

pub fn message(c: &mut Criterion) {
    c.bench_function("data_body_round_trip", |b| {
        let mut body = DataBody::new_request(MessageKind::GetOptionReq, 1, 0);
        body.qw_data[0] = 0xdead_beef;

        b.iter(|| {
            let buf = body.encode().unwrap();
            black_box(DataBody::decode(&buf).unwrap())
        })
    });

    c.bench_function("bin_body_round_trip_one_page", |b| {
        let body = BinBody::new_request(MessageKind::CommandReq, 1, 0, vec![0xab; 4096]);

        b.iter(|| {
            let buf = body.encode().unwrap();
            black_box(BinBody::decode(&buf).unwrap())
        })
    });
}

pub fn vfs_validation(c: &mut Criterion) {
    c.bench_function("verify_vfs_read", |b| {
        use byteorder::{NativeEndian, WriteBytesExt};
        let inner = vec![0xffu8; 4096];
        let mut payload = Vec::new();
        payload.write_u32::<NativeEndian>(1).unwrap(); // AGENT_VFS_RSP_VERSION
        payload.write_u32::<NativeEndian>(inner.len() as u32).unwrap();
        payload.write_u32::<NativeEndian>(inner.len() as u32).unwrap();
        payload.extend(inner);

        b.iter(|| black_box(vfs::verify_vfs(VfsCommand::Read, &payload).unwrap()))
    });
}

criterion_group!(benches, header, message, vfs_validation);
criterion_main!(benches);
