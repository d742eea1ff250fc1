//! Host allowlist, secret placeholder substitution, and local-model
//! routing decisions for the Matchlock proxy.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod engine;
mod error;
mod request;
mod resolver;
mod routing;
mod secret;

pub use engine::{PolicyEngine, PolicyEngineBuilder};
pub use error::PolicyError;
pub use request::{ProxyRequest, RouteDirective};
pub use resolver::{FixedResolver, HostResolver, SystemResolver};
pub use routing::{ModelMapping, RouteEntry, ROUTED_VIA_HEADER};
pub use secret::{Secret, SecretTable};
