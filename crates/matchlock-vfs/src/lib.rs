//! Protocol-level virtual filesystem: a provider trait, a handful of
//! providers (in-memory, host-backed, read-only wrapper), and
//! combinators (mount routing, copy-on-write overlay) that compose them.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod host;
mod memory;
mod overlay;
pub mod path;
mod provider;
mod readonly;
mod router;
mod types;

pub use error::{VfsError, VfsResult};
pub use host::HostVfs;
pub use memory::MemoryVfs;
pub use overlay::OverlayVfs;
pub use provider::VfsProvider;
pub use readonly::ReadonlyVfs;
pub use router::MountRouter;
pub use types::{DirEntry, Handle, HandleAllocator, Metadata};
