//! Before/after interception hooks for the virtual filesystem: a rule
//! engine and a `VfsProvider` wrapper that evaluates rules around every
//! call and forwards events to the sandbox event bus.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod engine;
mod intercept;
mod request;
mod rule;

pub use engine::{EventSink, HookEngine, MIN_QUEUE_CAPACITY};
pub use intercept::InterceptVfs;
pub use request::{HookRequest, VfsOp};
pub use rule::{Action, DynamicAction, HookRule, Phase, WriteReplacement};
