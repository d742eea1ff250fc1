//! Wire request/response records. Field keys are kept short since every
//! message is CBOR-encoded and sent over a length-prefixed stream.

use serde::{Deserialize, Serialize};

/// Operation codes the dispatcher recognizes, one per `VfsProvider`
/// method plus `Lookup` (an alias clients use before they hold a
/// handle, dispatched as a `stat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    Lookup,
    Getattr,
    Setattr,
    Read,
    Write,
    Create,
    Mkdir,
    MkdirAll,
    Unlink,
    Rmdir,
    Rename,
    Open,
    Release,
    Readdir,
    Fsync,
    Truncate,
    Symlink,
    Readlink,
    Link,
}

/// A client request. Optional fields are populated per the op: e.g.
/// `Write` needs `handle`, `offset`, and `data`; `Mkdir` needs `path`
/// and `mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "new-path", default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
}

impl Request {
    #[must_use]
    pub fn new(op: Op, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            new_path: None,
            handle: None,
            offset: None,
            size: None,
            data: None,
            flags: None,
            mode: None,
            uid: 0,
            gid: 0,
        }
    }
}

/// Metadata as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStat {
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
    pub mtime: u64,
    pub ino: u64,
}

impl From<matchlock_vfs::Metadata> for WireStat {
    fn from(meta: matchlock_vfs::Metadata) -> Self {
        Self {
            is_dir: meta.is_dir,
            mode: meta.mode,
            size: meta.size,
            mtime: meta.mtime,
            ino: meta.ino,
        }
    }
}

/// A directory entry as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDirEntry {
    pub name: String,
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
    pub ino: u64,
}

impl From<matchlock_vfs::DirEntry> for WireDirEntry {
    fn from(entry: matchlock_vfs::DirEntry) -> Self {
        Self {
            name: entry.name,
            is_dir: entry.is_dir,
            mode: entry.mode,
            size: entry.size,
            ino: entry.ino,
        }
    }
}

/// A server response. `err` is 0 on success, a negative errno
/// otherwise; every other field is populated only when meaningful for
/// the request's op and only on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub err: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<WireStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<WireDirEntry>>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn error(errno: i32) -> Self {
        Self {
            err: errno,
            ..Self::default()
        }
    }
}
