//! Metadata and directory-entry shapes shared by every provider.

/// File metadata returned by `stat`/`getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
    /// Modification time, seconds since the UNIX epoch.
    pub mtime: u64,
    pub ino: u64,
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
    pub ino: u64,
}

/// An opaque handle to an open file, issued by a provider's `open`/
/// `create` and consumed by `read`/`write`/`fsync`/`release`. Never
/// reused within a provider's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

/// Monotonically increasing handle allocator. Each provider that manages
/// open files owns one; handles are never reused even after release.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: std::sync::atomic::AtomicU64,
}

impl HandleAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> Handle {
        Handle(self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }
}
