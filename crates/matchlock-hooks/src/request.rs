//! The operation record hooks match against and can mutate.

use std::fmt;

/// Every VFS operation a hook can intercept, named after the
/// `VfsProvider` method it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsOp {
    Stat,
    Readdir,
    Mkdir,
    MkdirAll,
    Create,
    Open,
    Read,
    Write,
    Fsync,
    Release,
    Truncate,
    Setattr,
    Unlink,
    Rmdir,
    RemoveAll,
    Rename,
    Symlink,
    Readlink,
    Link,
}

impl fmt::Display for VfsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stat => "stat",
            Self::Readdir => "readdir",
            Self::Mkdir => "mkdir",
            Self::MkdirAll => "mkdir_all",
            Self::Create => "create",
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Fsync => "fsync",
            Self::Release => "release",
            Self::Truncate => "truncate",
            Self::Setattr => "setattr",
            Self::Unlink => "unlink",
            Self::Rmdir => "rmdir",
            Self::RemoveAll => "remove_all",
            Self::Rename => "rename",
            Self::Symlink => "symlink",
            Self::Readlink => "readlink",
            Self::Link => "link",
        };
        f.write_str(name)
    }
}

/// A single VFS call, as seen by the hook engine. `path` is always the
/// cleaned primary path; `new_path` carries the destination of a
/// rename/symlink/link. `data` is only populated for `Write`, and is
/// the only field a mutate-write hook may replace.
#[derive(Debug, Clone)]
pub struct HookRequest {
    pub op: VfsOp,
    pub path: String,
    pub new_path: Option<String>,
    pub data: Option<Vec<u8>>,
    pub flags: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl HookRequest {
    #[must_use]
    pub fn new(op: VfsOp, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            new_path: None,
            data: None,
            flags: 0,
            mode: 0,
            uid: 0,
            gid: 0,
        }
    }

    #[must_use]
    pub fn with_new_path(mut self, new_path: impl Into<String>) -> Self {
        self.new_path = Some(new_path.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Length of `data` as it currently stands, or 0 for ops with no
    /// payload. Callers building an event from a request that went
    /// through a mutate-write hook see the post-mutation length.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.len() as u64)
    }
}
