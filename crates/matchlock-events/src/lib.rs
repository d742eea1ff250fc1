//! Event bus and per-VM lifecycle tracking for the Matchlock sandbox supervisor.
//!
//! Every other component (policy engine, hook engine, HTTP proxy, exec
//! relay) holds a cloned [`EventBus`] producer handle and publishes
//! [`MatchlockEvent`]s; the sandbox owns the single [`EventReceiver`] and
//! one [`LifecycleStore`] per VM.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bus;
mod error;
mod event;
mod lifecycle;

pub use bus::{EventBus, EventReceiver, DEFAULT_CAPACITY};
pub use error::LifecycleError;
pub use event::{ExecEvent, FileEvent, MatchlockEvent, NetworkEvent};
pub use lifecycle::{CleanupStep, LifecycleStore, Phase};
