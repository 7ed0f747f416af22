#![doc = include_str!("../README.md")]
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unreachable_pub,
    missing_docs
)]

mod error;
pub use error::Error;

pub mod header;
pub use header::{Header, MessageKind};

pub mod message;
pub use message::{BinBody, DataBody};

pub mod compression;
pub use compression::{CompressionCodec, NullCodec};

pub mod config;
pub use config::{Config, ErrorInfo, RemoteUri, SpnMode};

pub mod open;
pub use open::OpenBody;

pub mod scatter;
pub use scatter::MemScatter;

pub mod vfs;
pub use vfs::{verify_vfs, VfsCommand, VfsResult};

pub mod transport;
pub use transport::{RemoteTransport, Transport};

pub mod keepalive;

pub mod session;
pub use session::{open, OpenOutcome, Session};
