use thiserror::Error;

/// Errors a VFS provider can return. Each maps to a POSIX errno at the
/// protocol boundary via [`VfsError::errno`].
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("read-only filesystem")]
    ReadOnly,

    #[error("cross-device rename")]
    CrossDevice,

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("bad handle")]
    BadHandle,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// Negated errno for the VFS protocol's `err` field (0 on success).
    #[must_use]
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::NotFound(_) => 2,         // ENOENT
            Self::NotADirectory(_) => 20,    // ENOTDIR
            Self::IsADirectory(_) => 21,     // EISDIR
            Self::Exists(_) => 17,           // EEXIST
            Self::NotEmpty(_) => 39,         // ENOTEMPTY
            Self::PermissionDenied(_) => 13, // EACCES
            Self::ReadOnly => 30,            // EROFS
            Self::CrossDevice => 18,         // EXDEV
            Self::NotSupported(_) => 95,     // ENOTSUP
            Self::BadHandle => 9,            // EBADF
            Self::Io(err) => err.raw_os_error().unwrap_or(5), // default EIO
        };
        -code
    }
}

/// Convenience result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_is_negated_and_nonzero() {
        assert_eq!(VfsError::NotFound("x".into()).errno(), -2);
        assert_eq!(VfsError::BadHandle.errno(), -9);
        assert_eq!(VfsError::CrossDevice.errno(), -18);
    }
}
