//! Layer-7 MITM HTTP/HTTPS proxy: two accept loops on ephemeral ports
//! plus an optional raw-TCP passthrough loop, all driven by a shared
//! [`matchlock_policy::PolicyEngine`] and [`matchlock_ca::CaPool`].

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod conn;
mod dial;
mod error;
mod forward;
mod http_loop;
mod http_message;
mod https_loop;
mod passthrough;
mod pool;
mod respond;
mod server;
mod tls;

pub use error::ProxyError;
pub use pool::{ConnectionPool, IDLE_TTL, MAX_IDLE_PER_HOST, REAP_INTERVAL};
pub use server::{start, start_passthrough, start_with_resolver, ProxyHandle, ProxyPorts};
pub use tls::{client_config, server_config, SniResolver};
