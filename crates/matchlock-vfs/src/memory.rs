//! An in-memory VFS provider, for tests and ephemeral scratch mounts.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use matchlock_core::inode;
use tokio::sync::RwLock;

use crate::error::{VfsError, VfsResult};
use crate::path::{clean, split_parent};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, Handle, HandleAllocator, Metadata};

#[derive(Debug, Clone)]
enum Node {
    Dir { mode: u32, mtime: u64 },
    File { data: Vec<u8>, mode: u32, mtime: u64 },
    Symlink { target: String, mtime: u64 },
}

struct OpenFile {
    path: String,
    write: bool,
}

/// A filesystem that exists only in process memory. `stat`/`readdir`
/// take a shared lock; every mutation takes an exclusive lock.
pub struct MemoryVfs {
    tree: RwLock<BTreeMap<String, Node>>,
    open: RwLock<BTreeMap<u64, OpenFile>>,
    handles: HandleAllocator,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl MemoryVfs {
    #[must_use]
    pub fn new() -> Self {
        let mut tree = BTreeMap::new();
        tree.insert(
            "/".to_string(),
            Node::Dir {
                mode: 0o755,
                mtime: now(),
            },
        );
        Self {
            tree: RwLock::new(tree),
            open: RwLock::new(BTreeMap::new()),
            handles: HandleAllocator::new(),
        }
    }

    fn node_metadata(path: &str, node: &Node) -> Metadata {
        match node {
            Node::Dir { mode, mtime } => Metadata {
                is_dir: true,
                mode: *mode,
                size: 0,
                mtime: *mtime,
                ino: inode::synthesize(path, true),
            },
            Node::File { data, mode, mtime } => Metadata {
                is_dir: false,
                mode: *mode,
                size: data.len() as u64,
                mtime: *mtime,
                ino: inode::synthesize(path, false),
            },
            Node::Symlink { mtime, .. } => Metadata {
                is_dir: false,
                mode: 0o777,
                size: 0,
                mtime: *mtime,
                ino: inode::synthesize(path, false),
            },
        }
    }

    fn has_children(tree: &BTreeMap<String, Node>, path: &str) -> bool {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        tree.keys().any(|k| k != path && k.starts_with(&prefix))
    }
}

impl Default for MemoryVfs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VfsProvider for MemoryVfs {
    async fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let path = clean(path)?;
        let tree = self.tree.read().await;
        let node = tree.get(&path).ok_or_else(|| VfsError::NotFound(path.clone()))?;
        Ok(Self::node_metadata(&path, node))
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = clean(path)?;
        let tree = self.tree.read().await;
        match tree.get(&path) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(VfsError::NotADirectory(path)),
            None => return Err(VfsError::NotFound(path)),
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut entries = Vec::new();
        for (key, node) in tree.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let meta = Self::node_metadata(key, node);
            entries.push(DirEntry {
                name: rest.to_string(),
                is_dir: meta.is_dir,
                mode: meta.mode,
                size: meta.size,
                ino: meta.ino,
            });
        }
        Ok(entries)
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = clean(path)?;
        let (parent, _) = split_parent(&path);
        let mut tree = self.tree.write().await;
        match tree.get(parent) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(VfsError::NotADirectory(parent.to_string())),
            None => return Err(VfsError::NotFound(parent.to_string())),
        }
        if tree.contains_key(&path) {
            return Err(VfsError::Exists(path));
        }
        tree.insert(path, Node::Dir { mode, mtime: now() });
        Ok(())
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        let mut built = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            built.push('/');
            built.push_str(segment);
            match tree.get(&built) {
                Some(Node::Dir { .. }) => continue,
                Some(_) => return Err(VfsError::NotADirectory(built)),
                None => {
                    tree.insert(built.clone(), Node::Dir { mode, mtime: now() });
                }
            }
        }
        Ok(())
    }

    async fn create(&self, path: &str, mode: u32) -> VfsResult<(Metadata, Handle)> {
        let path = clean(path)?;
        let (parent, _) = split_parent(&path);
        let mut tree = self.tree.write().await;
        match tree.get(parent) {
            Some(Node::Dir { .. }) => {}
            Some(_) => return Err(VfsError::NotADirectory(parent.to_string())),
            None => return Err(VfsError::NotFound(parent.to_string())),
        }
        tree.entry(path.clone()).or_insert_with(|| Node::File {
            data: Vec::new(),
            mode,
            mtime: now(),
        });
        let meta = Self::node_metadata(&path, tree.get(&path).expect("just inserted"));
        drop(tree);

        let handle = self.handles.allocate();
        self.open.write().await.insert(
            handle.0,
            OpenFile {
                path,
                write: true,
            },
        );
        Ok((meta, handle))
    }

    async fn open(&self, path: &str, write: bool, truncate: bool) -> VfsResult<Handle> {
        let path = clean(path)?;
        {
            let mut tree = self.tree.write().await;
            match tree.get_mut(&path) {
                Some(Node::File { data, mtime, .. }) => {
                    if truncate {
                        data.clear();
                        *mtime = now();
                    }
                }
                Some(Node::Dir { .. }) => return Err(VfsError::IsADirectory(path)),
                Some(Node::Symlink { .. }) => {
                    return Err(VfsError::NotSupported("open on symlink".into()))
                }
                None => return Err(VfsError::NotFound(path)),
            }
        }
        let handle = self.handles.allocate();
        self.open.write().await.insert(handle.0, OpenFile { path, write });
        Ok(handle)
    }

    async fn read(&self, handle: Handle, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let open = self.open.read().await;
        let entry = open.get(&handle.0).ok_or(VfsError::BadHandle)?;
        let tree = self.tree.read().await;
        match tree.get(&entry.path) {
            Some(Node::File { data, .. }) => {
                let offset = offset as usize;
                if offset >= data.len() {
                    return Ok(Vec::new());
                }
                #[allow(clippy::arithmetic_side_effects)]
                // Safety: clamped against data.len() before use; can't overflow in practice.
                let end = (offset + size as usize).min(data.len());
                Ok(data[offset..end].to_vec())
            }
            _ => Err(VfsError::BadHandle),
        }
    }

    async fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> VfsResult<u64> {
        let open = self.open.read().await;
        let entry = open.get(&handle.0).ok_or(VfsError::BadHandle)?;
        if !entry.write {
            return Err(VfsError::PermissionDenied("handle opened read-only".into()));
        }
        let mut tree = self.tree.write().await;
        match tree.get_mut(&entry.path) {
            Some(Node::File { data: existing, mtime, .. }) => {
                let offset = offset as usize;
                if existing.len() < offset {
                    existing.resize(offset, 0);
                }
                #[allow(clippy::arithmetic_side_effects)]
                // Safety: no file on this provider can approach usize::MAX bytes.
                let end = offset + data.len();
                if existing.len() < end {
                    existing.resize(end, 0);
                }
                existing[offset..end].copy_from_slice(data);
                *mtime = now();
                Ok(data.len() as u64)
            }
            _ => Err(VfsError::BadHandle),
        }
    }

    async fn fsync(&self, handle: Handle) -> VfsResult<()> {
        if self.open.read().await.contains_key(&handle.0) {
            Ok(())
        } else {
            Err(VfsError::BadHandle)
        }
    }

    async fn release(&self, handle: Handle) -> VfsResult<()> {
        self.open
            .write()
            .await
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(VfsError::BadHandle)
    }

    async fn truncate(&self, path: &str, size: u64) -> VfsResult<()> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        match tree.get_mut(&path) {
            Some(Node::File { data, mtime, .. }) => {
                data.resize(size as usize, 0);
                *mtime = now();
                Ok(())
            }
            Some(_) => Err(VfsError::IsADirectory(path)),
            None => Err(VfsError::NotFound(path)),
        }
    }

    async fn setattr(&self, path: &str, mode: u32) -> VfsResult<Metadata> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        match tree.get_mut(&path) {
            Some(Node::Dir { mode: m, .. } | Node::File { mode: m, .. }) => {
                *m = mode;
            }
            Some(Node::Symlink { .. }) => {}
            None => return Err(VfsError::NotFound(path)),
        }
        let node = tree.get(&path).expect("checked above");
        Ok(Self::node_metadata(&path, node))
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        match tree.get(&path) {
            Some(Node::Dir { .. }) => {
                if Self::has_children(&tree, &path) {
                    return Err(VfsError::NotEmpty(path));
                }
                tree.remove(&path);
                Ok(())
            }
            Some(_) => {
                tree.remove(&path);
                Ok(())
            }
            None => Err(VfsError::NotFound(path)),
        }
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        match tree.get(&path) {
            Some(Node::Dir { .. }) => {
                if Self::has_children(&tree, &path) {
                    return Err(VfsError::NotEmpty(path));
                }
                tree.remove(&path);
                Ok(())
            }
            Some(_) => Err(VfsError::NotADirectory(path)),
            None => Err(VfsError::NotFound(path)),
        }
    }

    async fn remove_all(&self, path: &str) -> VfsResult<()> {
        let path = clean(path)?;
        let mut tree = self.tree.write().await;
        let prefix = format!("{path}/");
        tree.retain(|k, _| *k != path && !k.starts_with(&prefix));
        tree.remove(&path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = clean(from)?;
        let to = clean(to)?;
        let mut tree = self.tree.write().await;
        let node = tree.remove(&from).ok_or_else(|| VfsError::NotFound(from.clone()))?;
        let prefix = format!("{from}/");
        let descendants: Vec<(String, Node)> = tree
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, _) in &descendants {
            tree.remove(key);
        }
        tree.insert(to.clone(), node);
        for (key, value) in descendants {
            let suffix = key.strip_prefix(&prefix).expect("prefix matched above");
            tree.insert(format!("{to}/{suffix}"), value);
        }
        Ok(())
    }

    async fn symlink(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let link_path = clean(link_path)?;
        let mut tree = self.tree.write().await;
        if tree.contains_key(&link_path) {
            return Err(VfsError::Exists(link_path));
        }
        tree.insert(
            link_path,
            Node::Symlink {
                target: target.to_string(),
                mtime: now(),
            },
        );
        Ok(())
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let path = clean(path)?;
        let tree = self.tree.read().await;
        match tree.get(&path) {
            Some(Node::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(VfsError::NotSupported("not a symlink".into())),
            None => Err(VfsError::NotFound(path)),
        }
    }

    async fn link(&self, target: &str, link_path: &str) -> VfsResult<()> {
        let target = clean(target)?;
        let link_path = clean(link_path)?;
        let mut tree = self.tree.write().await;
        let node = tree.get(&target).cloned().ok_or_else(|| VfsError::NotFound(target))?;
        if tree.contains_key(&link_path) {
            return Err(VfsError::Exists(link_path));
        }
        tree.insert(link_path, node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_write_close_open_read_round_trips() {
        let fs = MemoryVfs::new();
        let (_, handle) = fs.create("/file.txt", 0o644).await.unwrap();
        fs.write(handle, 0, b"hello world").await.unwrap();
        fs.release(handle).await.unwrap();

        let handle = fs.open("/file.txt", false, false).await.unwrap();
        let data = fs.read(handle, 0, 64).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn remove_nonempty_dir_fails_with_not_empty() {
        let fs = MemoryVfs::new();
        fs.mkdir("/d", 0o755).await.unwrap();
        fs.create("/d/f", 0o644).await.unwrap();
        let err = fs.rmdir("/d").await.unwrap_err();
        assert!(matches!(err, VfsError::NotEmpty(_)));
    }

    #[tokio::test]
    async fn remove_all_is_recursive() {
        let fs = MemoryVfs::new();
        fs.mkdir("/d", 0o755).await.unwrap();
        fs.create("/d/f", 0o644).await.unwrap();
        fs.remove_all("/d").await.unwrap();
        assert!(matches!(fs.stat("/d").await, Err(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn read_after_release_fails_with_bad_handle() {
        let fs = MemoryVfs::new();
        let (_, handle) = fs.create("/f", 0o644).await.unwrap();
        fs.release(handle).await.unwrap();
        let err = fs.read(handle, 0, 10).await.unwrap_err();
        assert!(matches!(err, VfsError::BadHandle));
    }

    #[tokio::test]
    async fn rename_moves_descendants() {
        let fs = MemoryVfs::new();
        fs.mkdir("/a", 0o755).await.unwrap();
        fs.create("/a/f", 0o644).await.unwrap();
        fs.rename("/a", "/b").await.unwrap();
        assert!(fs.stat("/b/f").await.is_ok());
        assert!(matches!(fs.stat("/a").await, Err(VfsError::NotFound(_))));
    }
}
