//! A provider backed by a real directory on the host filesystem, rooted
//! at one directory so the guest can never see outside it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use matchlock_core::inode;
use tokio::fs;
use tokio::sync::{RwLock, Semaphore};

use crate::error::{VfsError, VfsResult};
use crate::path::clean;
use crate::provider::VfsProvider;
use crate::types::{DirEntry, Handle, HandleAllocator, Metadata};

const MAX_OPEN_FILES: usize = 64;

/// Caps a single read so a guest can't force unbounded host memory use
/// in one call; the guest VFS client is expected to read in chunks.
const MAX_READ_BYTES: u64 = 50 * 1024 * 1024;

pub struct HostVfs {
    root: PathBuf,
    open_files: RwLock<HashMap<u64, Arc<RwLock<fs::File>>>>,
    fd_semaphore: Arc<Semaphore>,
    handles: HandleAllocator,
}

impl HostVfs {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            open_files: RwLock::new(HashMap::new()),
            fd_semaphore: Arc::new(Semaphore::new(MAX_OPEN_FILES)),
            handles: HandleAllocator::new(),
        }
    }

    /// Resolve a cleaned virtual path to a physical path under `root`,
    /// rejecting any symlink found along the way: a symlink could point
    /// outside the root and silently widen the sandbox boundary.
    async fn resolve_physical(&self, path: &str) -> VfsResult<PathBuf> {
        let cleaned = clean(path)?;
        let relative = cleaned.trim_start_matches('/');
        let target = self.root.join(relative);

        let canonical_root = fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());

        let mut check = target.clone();
        let mut pending = Vec::new();
        loop {
            match fs::symlink_metadata(&check).await {
                Ok(meta) => {
                    if meta.is_symlink() {
                        return Err(VfsError::PermissionDenied(
                            "symlinks are not permitted under a host-backed mount".into(),
                        ));
                    }
                    let canonical = fs::canonicalize(&check).await.map_err(VfsError::from)?;
                    if !canonical.starts_with(&canonical_root) {
                        return Err(VfsError::PermissionDenied(
                            "path resolves outside the host-backed mount".into(),
                        ));
                    }
                    let mut resolved = canonical;
                    for component in pending.into_iter().rev() {
                        resolved.push(component);
                    }
                    return Ok(resolved);
                }
                Err(_) => match check.parent() {
                    Some(parent) => {
                        if let Some(name) = check.file_name() {
                            pending.push(name.to_owned());
                        }
                        check = parent.to_path_buf();
                    }
                    None => return Ok(target),
                },
            }
        }
    }

    async fn metadata_for(path: &Path, virtual_path: &str) -> VfsResult<Metadata> {
        let meta = fs::metadata(path).await.map_err(VfsError::from)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let mode = mode_of(&meta);
        Ok(Metadata {
            is_dir: meta.is_dir(),
            mode,
            size: meta.len(),
            mtime,
            ino: inode::synthesize(virtual_path, meta.is_dir()),
        })
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[async_trait]
impl VfsProvider for HostVfs {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let target = self.resolve_physical(path).await?;
        Self::metadata_for(&target, &clean(path)?).await
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let target = self.resolve_physical(path).await?;
        let mut read_dir = fs::read_dir(&target).await.map_err(VfsError::from)?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(VfsError::from)? {
            let meta = entry.metadata().await.map_err(VfsError::from)?;
            let name = entry.file_name().to_string_lossy().to_string();
            let virtual_path = format!("{}/{name}", clean(path)?.trim_end_matches('/'));
            entries.push(DirEntry {
                is_dir: meta.is_dir(),
                mode: mode_of(&meta),
                size: meta.len(),
                ino: inode::synthesize(&virtual_path, meta.is_dir()),
                name,
            });
        }
        Ok(entries)
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(VfsError::Exists(path.to_string()));
        }
        fs::create_dir(&target).await.map_err(VfsError::from)?;
        set_mode(&target, mode).await;
        Ok(())
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        fs::create_dir_all(&target).await.map_err(VfsError::from)?;
        set_mode(&target, mode).await;
        Ok(())
    }

    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)> {
        let target = self.resolve_physical(path).await?;
        let permit = self
            .fd_semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| VfsError::PermissionDenied("too many open files".into()))?;

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)
            .await
            .map_err(VfsError::from)?;
        set_mode(&target, mode).await;

        let meta = Self::metadata_for(&target, &clean(path)?).await?;
        let handle = self.handles.allocate();
        self.open_files.write().await.insert(handle.0, Arc::new(RwLock::new(file)));
        permit.forget();
        Ok((meta, handle))
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        let target = self.resolve_physical(path).await?;
        let permit = self
            .fd_semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| VfsError::PermissionDenied("too many open files".into()))?;

        let file = fs::OpenOptions::new()
            .read(true)
            .write(write)
            .truncate(truncate && write)
            .open(&target)
            .await
            .map_err(VfsError::from)?;

        let handle = self.handles.allocate();
        self.open_files.write().await.insert(handle.0, Arc::new(RwLock::new(file)));
        permit.forget();
        Ok(handle)
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let files = self.open_files.read().await;
        let file = files.get(&handle.0).ok_or(VfsError::BadHandle)?.clone();
        drop(files);

        let mut file = file.write().await;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(VfsError::from)?;
        let want = u64::from(size).min(MAX_READ_BYTES) as usize;
        let mut buf = vec![0u8; want];
        let read = file.read(&mut buf).await.map_err(VfsError::from)?;
        buf.truncate(read);
        Ok(buf)
    }

    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        let files = self.open_files.read().await;
        let file = files.get(&handle.0).ok_or(VfsError::BadHandle)?.clone();
        drop(files);

        let mut file = file.write().await;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(VfsError::from)?;
        file.write_all(data).await.map_err(VfsError::from)?;
        Ok(data.len() as u64)
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        use tokio::io::AsyncWriteExt;
        let files = self.open_files.read().await;
        let file = files.get(&handle.0).ok_or(VfsError::BadHandle)?.clone();
        drop(files);
        let result = file.write().await.flush().await.map_err(VfsError::from);
        result
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        let removed = self.open_files.write().await.remove(&handle.0);
        if removed.is_some() {
            self.fd_semaphore.add_permits(1);
            Ok(())
        } else {
            Err(VfsError::BadHandle)
        }
    }

    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&target)
            .await
            .map_err(VfsError::from)?;
        file.set_len(size).await.map_err(VfsError::from)
    }

    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata> {
        let target = self.resolve_physical(path).await?;
        set_mode(&target, mode).await;
        Self::metadata_for(&target, &clean(path)?).await
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        let meta = fs::symlink_metadata(&target).await.map_err(VfsError::from)?;
        if meta.is_dir() {
            Err(VfsError::IsADirectory(path.to_string()))
        } else {
            fs::remove_file(&target).await.map_err(VfsError::from)
        }
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        fs::remove_dir(&target).await.map_err(|err| {
            if err.raw_os_error() == Some(39) {
                VfsError::NotEmpty(path.to_string())
            } else {
                VfsError::from(err)
            }
        })
    }

    async fn remove_all(&self, path: &str) -> VfsResult<()> {
        let target = self.resolve_physical(path).await?;
        fs::remove_dir_all(&target).await.map_err(VfsError::from)
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from_target = self.resolve_physical(from).await?;
        let to_target = self.resolve_physical(to).await?;
        fs::rename(&from_target, &to_target).await.map_err(VfsError::from)
    }

    async fn symlink(&self, _target: &str, _link_path: &str) -> VfsResult<()> {
        Err(VfsError::NotSupported(
            "symlinks are disabled under a host-backed mount".into(),
        ))
    }

    async fn readlink(&self, _path: &str) -> VfsResult<String> {
        Err(VfsError::NotSupported(
            "symlinks are disabled under a host-backed mount".into(),
        ))
    }

    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let target = self.resolve_physical(target).await?;
        let link_path = self.resolve_physical(link_path).await?;
        fs::hard_link(&target, &link_path).await.map_err(VfsError::from)
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await;
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_write_close_open_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = HostVfs::new(dir.path().to_path_buf());

        let (_, handle) = fs.create("/file.txt", 0o644).await.unwrap();
        fs.write(handle, 0, b"hello host").await.unwrap();
        fs.release(handle).await.unwrap();

        let handle = fs.open("/file.txt", false, false).await.unwrap();
        let data = fs.read(handle, 0, 64).await.unwrap();
        assert_eq!(data, b"hello host");
    }

    #[tokio::test]
    async fn rejects_paths_that_escape_the_root_via_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
            let fs = HostVfs::new(dir.path().to_path_buf());
            let err = fs.stat("/escape").await.unwrap_err();
            assert!(matches!(err, VfsError::PermissionDenied(_)));
        }
    }
}
