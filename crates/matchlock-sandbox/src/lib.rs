//! The top-level per-VM sandbox entity: wires the policy engine, CA
//! pool, VFS mount tree, proxy, and relay together behind one
//! [`Sandbox`] and coordinates their shutdown (spec §3, §4.8).

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod build;
mod config;
mod error;
mod registry;
mod resource;
mod sandbox;

pub use config::{
    HookActionConfig, HookPhaseConfig, HookRuleConfig, MountConfig, PolicyConfig, ProviderConfig, RouteConfig,
    SandboxConfig, SecretConfig,
};
pub use error::{SandboxError, SandboxResult};
pub use resource::ExternalResource;
pub use sandbox::{Sandbox, ShutdownReport, READY_TIMEOUT};
