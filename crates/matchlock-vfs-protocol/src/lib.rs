//! Wire protocol spoken between a guest-side VFS client and the host
//! dispatcher: framed CBOR requests/responses over a duplex stream,
//! plus the handle bookkeeping and transport plumbing around it.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod dispatch;
mod error;
mod frame;
mod handles;
mod message;
mod server;

pub use dispatch::{CallerAware, Dispatcher};
pub use error::ProtocolError;
pub use frame::{read_frame, write_frame, MAX_FRAME_BYTES};
pub use handles::HandleRegistry;
pub use message::{Op, Request, Response, WireDirEntry, WireStat};
pub use server::{serve, Conn, Transport};

#[cfg(unix)]
pub use server::unix::UnixTransport;

#[cfg(target_os = "linux")]
pub use server::vsock::VsockTransport;
