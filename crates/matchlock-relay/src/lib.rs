//! Exec and port-forward relay: a framed Unix-socket protocol
//! multiplexing command execution and TCP forwarding over one
//! connection per session, each backed by a guest-vsock stream.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod frame;
mod machine;
mod message;
mod server;
mod session;

pub use error::RelayError;
pub use frame::MAX_FRAME_BYTES;
pub use machine::{GuestStream, Machine, GUEST_EXEC_PORT};
pub use message::{
    ExecInteractiveRequest, ExecRequest, ExecResult, Message, PortForwardRequest,
};
pub use server::RelayServer;
pub use session::run_session;
