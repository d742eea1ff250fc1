//! Wraps a provider so every write-path operation fails with
//! [`VfsError::ReadOnly`] instead of reaching the inner provider.

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, Handle, Metadata};

pub struct ReadonlyVfs {
    inner: Box<dyn VfsProvider>,
}

impl ReadonlyVfs {
    #[must_use]
    pub fn new(inner: Box<dyn VfsProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VfsProvider for ReadonlyVfs {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        self.inner.stat(path).await
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        self.inner.readdir(path).await
    }

    async fn mkdir(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn mkdir_all(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn create(&self, _path: &str, _mode: u32) -> VfsResult<(Metadata, Handle)> {
        Err(VfsError::ReadOnly)
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        if write || truncate {
            return Err(VfsError::ReadOnly);
        }
        self.inner.open(path, false, false).await
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        self.inner.read(handle, offset, size).await
    }

    async fn write(&self, _handle: Handle, _offset: u64, _data: &[u8]) -> VfsResult<u64> {
        Err(VfsError::ReadOnly)
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        self.inner.fsync(handle).await
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        self.inner.release(handle).await
    }

    async fn truncate(&self, _path: &str, _size: u64) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn setattr(&self, _path: &str, _mode: u32) -> VfsResult<Metadata> {
        Err(VfsError::ReadOnly)
    }

    async fn unlink(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn rmdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn remove_all(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn rename(&self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn symlink(&self, _target: &str, _link_path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        self.inner.readlink(path).await
    }

    async fn link(&self, _target: &str, _link_path: &str) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryVfs;

    #[tokio::test]
    async fn writes_are_rejected_reads_pass_through() {
        let mem = MemoryVfs::new();
        let (_, h) = mem.create("/f", 0o644).await.unwrap();
        mem.write(h, 0, b"data").await.unwrap();
        mem.release(h).await.unwrap();

        let ro = ReadonlyVfs::new(Box::new(mem));
        assert!(ro.stat("/f").await.is_ok());
        assert!(matches!(ro.mkdir("/d", 0o755).await, Err(VfsError::ReadOnly)));
        assert!(matches!(
            ro.unlink("/f").await,
            Err(VfsError::ReadOnly)
        ));
    }
}
