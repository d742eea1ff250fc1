//! A `VfsProvider` wrapper that runs every call through a [`HookEngine`].

use async_trait::async_trait;
use matchlock_vfs::{DirEntry, Handle, Metadata, VfsError, VfsProvider, VfsResult};

use crate::engine::HookEngine;
use crate::request::{HookRequest, VfsOp};

pub struct InterceptVfs {
    inner: Box<dyn VfsProvider>,
    engine: HookEngine,
}

impl InterceptVfs {
    #[must_use]
    pub fn new(inner: Box<dyn VfsProvider>, engine: HookEngine) -> Self {
        Self { inner, engine }
    }

    fn guard<T>(&self, request: HookRequest, outcome: VfsResult<T>) -> VfsResult<T> {
        self.engine.run_after(&request, outcome.is_ok());
        outcome
    }

    fn before(&self, request: &mut HookRequest) -> VfsResult<()> {
        self.engine.run_before(request)
    }
}

#[async_trait]
impl VfsProvider for InterceptVfs {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let mut req = HookRequest::new(VfsOp::Stat, path);
        self.before(&mut req)?;
        let result = self.inner.stat(path).await;
        self.guard(req, result)
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let mut req = HookRequest::new(VfsOp::Readdir, path);
        self.before(&mut req)?;
        let result = self.inner.readdir(path).await;
        self.guard(req, result)
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Mkdir, path).with_mode(mode);
        self.before(&mut req)?;
        let result = self.inner.mkdir(path, mode).await;
        self.guard(req, result)
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::MkdirAll, path).with_mode(mode);
        self.before(&mut req)?;
        let result = self.inner.mkdir_all(path, mode).await;
        self.guard(req, result)
    }

    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)> {
        let mut req = HookRequest::new(VfsOp::Create, path).with_mode(mode);
        self.before(&mut req)?;
        let result = self.inner.create(path, mode).await;
        self.guard(req, result)
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        let mut req = HookRequest::new(VfsOp::Open, path);
        #[allow(clippy::arithmetic_side_effects)]
        // Safety: shifting a 0/1 value left by 1 bit never overflows u32.
        {
            req.flags = u32::from(write) | (u32::from(truncate) << 1);
        }
        self.before(&mut req)?;
        let result = self.inner.open(path, write, truncate).await;
        self.guard(req, result)
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        // Handle-keyed calls carry no path; the inner provider owns the
        // mapping from handle to path, so reads/writes aren't matched
        // against path-globbed rules (only op-globbed ones apply).
        let mut req = HookRequest::new(VfsOp::Read, String::new());
        req.flags = offset as u32;
        self.before(&mut req)?;
        let result = self.inner.read(handle, offset, size).await;
        self.guard(req, result)
    }

    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        // Capture the guest-visible length before any before-hook can
        // replace `req.data` with a different number of bytes.
        let guest_visible = data.len() as u64;
        let mut req = HookRequest::new(VfsOp::Write, String::new()).with_data(data.to_vec());
        self.before(&mut req)?;
        let payload = req.data.as_deref().unwrap_or(data);
        let result = self.inner.write(handle, offset, payload).await;
        // Write accounting: report the guest-visible length, not
        // whatever a mutate-write hook caused the provider to store.
        let result = result.map(|_| guest_visible);
        self.guard(req, result)
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Fsync, String::new());
        self.before(&mut req)?;
        let result = self.inner.fsync(handle).await;
        self.guard(req, result)
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Release, String::new());
        self.before(&mut req)?;
        let result = self.inner.release(handle).await;
        self.guard(req, result)
    }

    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Truncate, path);
        req.flags = size as u32;
        self.before(&mut req)?;
        let result = self.inner.truncate(path, size).await;
        self.guard(req, result)
    }

    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata> {
        let mut req = HookRequest::new(VfsOp::Setattr, path).with_mode(mode);
        self.before(&mut req)?;
        let result = self.inner.setattr(path, mode).await;
        self.guard(req, result)
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Unlink, path);
        self.before(&mut req)?;
        let result = self.inner.unlink(path).await;
        self.guard(req, result)
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Rmdir, path);
        self.before(&mut req)?;
        let result = self.inner.rmdir(path).await;
        self.guard(req, result)
    }

    async fn remove_all(&self, path: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::RemoveAll, path);
        self.before(&mut req)?;
        let result = self.inner.remove_all(path).await;
        self.guard(req, result)
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Rename, from).with_new_path(to);
        self.before(&mut req)?;
        let result = self.inner.rename(from, to).await;
        self.guard(req, result)
    }

    async fn symlink(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Symlink, link_path).with_new_path(target);
        self.before(&mut req)?;
        let result = self.inner.symlink(target, link_path).await;
        self.guard(req, result)
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let mut req = HookRequest::new(VfsOp::Readlink, path);
        self.before(&mut req)?;
        let result = self.inner.readlink(path).await;
        self.guard(req, result)
    }

    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let mut req = HookRequest::new(VfsOp::Link, target).with_new_path(link_path);
        self.before(&mut req)?;
        let result = self.inner.link(target, link_path).await;
        self.guard(req, result)
    }
}
