//! Longest-prefix mount routing over a set of providers.

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};
use crate::path::clean;
use crate::provider::VfsProvider;
use crate::types::{DirEntry, Handle, Metadata};

struct Mount {
    path: String,
    provider: Box<dyn VfsProvider>,
}

/// Routes calls to the longest matching mount point. Mounts are kept
/// sorted by path length, descending, so the first match found is the
/// most specific one: for mounts `{A, A/B}`, `A/B/x` resolves to the
/// `A/B` mount with remainder `/x`.
pub struct MountRouter {
    mounts: Vec<Mount>,
}

impl MountRouter {
    #[must_use]
    pub fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// Mount `provider` at `path` (a cleaned absolute path, `/` for root).
    pub fn mount(&mut self, path: impl Into<String>, provider: Box<dyn VfsProvider>) {
        let path = path.into();
        self.mounts.push(Mount { path, provider });
        self.mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
    }

    /// Find the mount covering `path`, returning the mount's own index
    /// and the path relative to that mount (`/` if the match is exact).
    fn resolve(&self, path: &str) -> VfsResult<(usize, String)> {
        for (i, mount) in self.mounts.iter().enumerate() {
            if mount.path == "/" {
                return Ok((i, path.to_string()));
            }
            if path == mount.path {
                return Ok((i, "/".to_string()));
            }
            if let Some(rest) = path.strip_prefix(&mount.path) {
                if let Some(rest) = rest.strip_prefix('/') {
                    return Ok((i, format!("/{rest}")));
                }
            }
        }
        Err(VfsError::NotFound(path.to_string()))
    }
}

impl Default for MountRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VfsProvider for MountRouter {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.stat(&rest).await
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.readdir(&rest).await
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.mkdir(&rest, mode).await
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.mkdir_all(&rest, mode).await
    }

    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.create(&rest, mode).await
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.open(&rest, write, truncate).await
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        self.read_via_any_mount(handle, offset, size).await
    }

    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        self.write_via_any_mount(handle, offset, data).await
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        for mount in &self.mounts {
            if mount.provider.fsync(handle).await.is_ok() {
                return Ok(());
            }
        }
        Err(VfsError::BadHandle)
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        for mount in &self.mounts {
            if mount.provider.release(handle).await.is_ok() {
                return Ok(());
            }
        }
        Err(VfsError::BadHandle)
    }

    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.truncate(&rest, size).await
    }

    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.setattr(&rest, mode).await
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.unlink(&rest).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.rmdir(&rest).await
    }

    async fn remove_all(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.remove_all(&rest).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = clean(from)?;
        let to = clean(to)?;
        let (from_i, from_rest) = self.resolve(&from)?;
        let (to_i, to_rest) = self.resolve(&to)?;
        if from_i != to_i {
            return Err(VfsError::CrossDevice);
        }
        self.mounts[from_i].provider.rename(&from_rest, &to_rest).await
    }

    async fn symlink(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let link_path = clean(link_path)?;
        let (i, rest) = self.resolve(&link_path)?;
        self.mounts[i].provider.symlink(target, &rest).await
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let path = clean(path)?;
        let (i, rest) = self.resolve(&path)?;
        self.mounts[i].provider.readlink(&rest).await
    }

    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let target = clean(target)?;
        let link_path = clean(link_path)?;
        let (target_i, target_rest) = self.resolve(&target)?;
        let (link_i, link_rest) = self.resolve(&link_path)?;
        if target_i != link_i {
            return Err(VfsError::CrossDevice);
        }
        self.mounts[target_i].provider.link(&target_rest, &link_rest).await
    }
}

impl MountRouter {
    // Handle-taking calls carry no path, so the router can't resolve a
    // mount directly; it tries each mount in turn. Handles are allocated
    // per-provider and never reused, so at most one mount recognizes a
    // given handle.
    async fn read_via_any_mount(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        for mount in &self.mounts {
            if let Ok(data) = mount.provider.read(handle, offset, size).await {
                return Ok(data);
            }
        }
        Err(VfsError::BadHandle)
    }

    async fn write_via_any_mount(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        for mount in &self.mounts {
            if let Ok(written) = mount.provider.write(handle, offset, data).await {
                return Ok(written);
            }
        }
        Err(VfsError::BadHandle)
    }
}
