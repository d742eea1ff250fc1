//! Copy-on-write overlay: reads fall through to `lower` when absent from
//! `upper`; every write-path operation first copies the target (and its
//! missing ancestor directories) up from `lower`, then proceeds against
//! `upper` only. There is no whiteout support: a path deleted from
//! `upper` but still present in `lower` remains visible through the
//! overlay: a full whiteout protocol is not implemented.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::path::split_parent;
use crate::provider::VfsProvider;
use crate::types::{DirEntry, Handle, Metadata};

const COPY_CHUNK: u32 = 32 * 1024;

pub struct OverlayVfs {
    lower: Box<dyn VfsProvider>,
    upper: Box<dyn VfsProvider>,
    copy_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OverlayVfs {
    #[must_use]
    pub fn new(lower: Box<dyn VfsProvider>, upper: Box<dyn VfsProvider>) -> Self {
        Self {
            lower,
            upper,
            copy_locks: DashMap::new(),
        }
    }

    fn copy_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.copy_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Copy `path`'s ancestor directories up from lower, creating any
    /// that are missing in upper (best-effort mode: default 0o755 if
    /// lower doesn't have that level either).
    async fn ensure_parents(&self, path: &str) -> VfsResult<()> {
        let (parent, _) = split_parent(path);
        if parent == "/" {
            return Ok(());
        }
        let mut built = String::new();
        for segment in parent.split('/').filter(|s| !s.is_empty()) {
            built.push('/');
            built.push_str(segment);
            if self.upper.stat(&built).await.is_ok() {
                continue;
            }
            let mode = self.lower.stat(&built).await.map_or(0o755, |m| m.mode);
            match self.upper.mkdir(&built, mode).await {
                Ok(()) | Err(VfsError::Exists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Ensure `path` exists in upper, copying it (and its contents, for
    /// a regular file) from lower if it's currently lower-only. A no-op
    /// if `path` already exists in upper or doesn't exist anywhere.
    async fn ensure_upper(&self, path: &str) -> VfsResult<()> {
        if self.upper.stat(path).await.is_ok() {
            return Ok(());
        }

        let lock = self.copy_lock(path);
        let _guard = lock.lock().await;
        if self.upper.stat(path).await.is_ok() {
            return Ok(());
        }

        let meta = match self.lower.stat(path).await {
            Ok(meta) => meta,
            Err(VfsError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        self.ensure_parents(path).await?;

        if meta.is_dir {
            match self.upper.mkdir(path, meta.mode).await {
                Ok(()) | Err(VfsError::Exists(_)) => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            self.copy_file_up(path, meta.mode).await
        }
    }

    async fn copy_file_up(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (_, write_handle) = self.upper.create(path, mode).await?;
        let read_handle = self.lower.open(path, false, false).await?;

        let mut offset = 0u64;
        let copy_result = async {
            loop {
                let chunk = self.lower.read(read_handle, offset, COPY_CHUNK).await?;
                if chunk.is_empty() {
                    return Ok(());
                }
                self.upper.write(write_handle, offset, &chunk).await?;
                #[allow(clippy::arithmetic_side_effects)]
                // Safety: a file can't exceed u64::MAX bytes on any real filesystem.
                {
                    offset += chunk.len() as u64;
                }
            }
        }
        .await;

        let _ = self.lower.release(read_handle).await;
        self.upper.release(write_handle).await?;
        copy_result
    }
}

#[async_trait]
impl VfsProvider for OverlayVfs {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        match self.upper.stat(path).await {
            Ok(meta) => Ok(meta),
            Err(VfsError::NotFound(_)) => self.lower.stat(path).await,
            Err(err) => Err(err),
        }
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let mut merged: HashMap<String, DirEntry> = HashMap::new();
        let mut any_side_found = false;

        if let Ok(entries) = self.lower.readdir(path).await {
            any_side_found = true;
            for entry in entries {
                merged.insert(entry.name.clone(), entry);
            }
        }
        match self.upper.readdir(path).await {
            Ok(entries) => {
                any_side_found = true;
                for entry in entries {
                    merged.insert(entry.name.clone(), entry);
                }
            }
            Err(VfsError::NotFound(_)) if any_side_found => {}
            Err(err) if !any_side_found => return Err(err),
            Err(_) => {}
        }

        if !any_side_found {
            return Err(VfsError::NotFound(path.to_string()));
        }
        Ok(merged.into_values().collect())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.ensure_parents(path).await?;
        self.upper.mkdir(path, mode).await
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.ensure_parents(path).await?;
        self.upper.mkdir_all(path, mode).await
    }

    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)> {
        self.ensure_parents(path).await?;
        self.upper.create(path, mode).await
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        if write || truncate {
            self.ensure_upper(path).await?;
            return self.upper.open(path, write, truncate).await;
        }
        match self.upper.stat(path).await {
            Ok(_) => self.upper.open(path, false, false).await,
            Err(VfsError::NotFound(_)) => self.lower.open(path, false, false).await,
            Err(err) => Err(err),
        }
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        if let Ok(data) = self.upper.read(handle, offset, size).await {
            return Ok(data);
        }
        self.lower.read(handle, offset, size).await
    }

    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        self.upper.write(handle, offset, data).await
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        if self.upper.fsync(handle).await.is_ok() {
            return Ok(());
        }
        self.lower.fsync(handle).await
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        if self.upper.release(handle).await.is_ok() {
            return Ok(());
        }
        self.lower.release(handle).await
    }

    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()> {
        self.ensure_upper(path).await?;
        self.upper.truncate(path, size).await
    }

    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata> {
        self.ensure_upper(path).await?;
        self.upper.setattr(path, mode).await
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        match self.upper.unlink(path).await {
            Ok(()) => Ok(()),
            Err(VfsError::NotFound(_)) => {
                if self.lower.stat(path).await.is_ok() {
                    Err(VfsError::PermissionDenied(
                        "cannot delete lower-only path: whiteouts are unsupported".into(),
                    ))
                } else {
                    Err(VfsError::NotFound(path.to_string()))
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        match self.upper.rmdir(path).await {
            Ok(()) => Ok(()),
            Err(VfsError::NotFound(_)) => {
                if self.lower.stat(path).await.is_ok() {
                    Err(VfsError::PermissionDenied(
                        "cannot delete lower-only path: whiteouts are unsupported".into(),
                    ))
                } else {
                    Err(VfsError::NotFound(path.to_string()))
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn remove_all(&self, path: &str) -> VfsResult<()> {
        self.upper.remove_all(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.ensure_upper(from).await?;
        self.ensure_parents(to).await?;
        self.upper.rename(from, to).await
    }

    async fn symlink(&self, target: &str, link_path: &str) -> VfsResult<()> {
        self.ensure_parents(link_path).await?;
        self.upper.symlink(target, link_path).await
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        match self.upper.readlink(path).await {
            Ok(target) => Ok(target),
            Err(VfsError::NotFound(_)) => self.lower.readlink(path).await,
            Err(err) => Err(err),
        }
    }

    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()> {
        self.ensure_upper(target).await?;
        self.ensure_parents(link_path).await?;
        self.upper.link(target, link_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryVfs;

    async fn seeded_lower() -> MemoryVfs {
        let lower = MemoryVfs::new();
        lower.mkdir("/etc", 0o700).await.unwrap();
        let (_, h) = lower.create("/etc/config", 0o640).await.unwrap();
        lower.write(h, 0, b"lower contents").await.unwrap();
        lower.release(h).await.unwrap();
        lower
    }

    #[tokio::test]
    async fn copy_up_preserves_mode_and_stops_touching_lower() {
        let lower = seeded_lower().await;
        let overlay = OverlayVfs::new(Box::new(lower), Box::new(MemoryVfs::new()));

        let h = overlay.open("/etc/config", true, false).await.unwrap();
        overlay.write(h, 0, b"upper contents").await.unwrap();
        overlay.release(h).await.unwrap();

        let meta = overlay.stat("/etc/config").await.unwrap();
        assert_eq!(meta.mode, 0o640);

        let h = overlay.open("/etc/config", false, false).await.unwrap();
        let data = overlay.read(h, 0, 64).await.unwrap();
        assert_eq!(data, b"upper contents");
    }

    #[tokio::test]
    async fn reads_fall_through_until_first_write() {
        let lower = seeded_lower().await;
        let overlay = OverlayVfs::new(Box::new(lower), Box::new(MemoryVfs::new()));

        let h = overlay.open("/etc/config", false, false).await.unwrap();
        let data = overlay.read(h, 0, 64).await.unwrap();
        assert_eq!(data, b"lower contents");
    }

    #[tokio::test]
    async fn readdir_merges_upper_over_lower() {
        let lower = seeded_lower().await;
        let upper = MemoryVfs::new();
        upper.mkdir("/etc", 0o700).await.unwrap();
        upper.create("/etc/override", 0o600).await.unwrap();
        let overlay = OverlayVfs::new(Box::new(lower), Box::new(upper));

        let entries = overlay.readdir("/etc").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"config"));
        assert!(names.contains(&"override"));
    }
}
