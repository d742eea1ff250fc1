//! The provider trait every VFS backend implements: absolute, cleaned
//! paths in, POSIX-shaped errors out.

use async_trait::async_trait;

use crate::error::VfsResult;
use crate::types::{DirEntry, Handle, Metadata};

/// A virtual filesystem backend. Implementors may be stacked (overlay,
/// mount router, intercept) or leaves (memory, host-backed).
#[async_trait]
pub trait VfsProvider: Send + Sync {
    async fn stat(&self, path: &str) -> VfsResult<Metadata>;
    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;
    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()>;
    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()>;
    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)>;
    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle>;
    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>>;
    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64>;
    async fn fsync(&self, handle: Handle) -> VfsResult<()>;
    async fn release(&self, handle: Handle) -> VfsResult<()>;
    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()>;
    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata>;
    async fn unlink(&self, path: &str) -> VfsResult<()>;
    async fn rmdir(&self, path: &str) -> VfsResult<()>;
    async fn remove_all(&self, path: &str) -> VfsResult<()>;
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;
    async fn symlink(&self, target: &str, link_path: &str) -> VfsResult<()>;
    async fn readlink(&self, path: &str) -> VfsResult<String>;
    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()>;
}
