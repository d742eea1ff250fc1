//! Per-sandbox MITM certificate authority: RSA-2048 root plus a
//! never-evicted, lazily-issued cache of per-SNI leaf certificates.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod ca;
mod error;
mod rsakey;

pub use ca::{CaPool, LeafCertificate};
pub use error::CaError;
