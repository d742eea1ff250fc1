use thiserror::Error;

/// Errors surfaced by a single, typed component during sandbox
/// construction or shutdown. Construction and shutdown paths join these
/// (see [`crate::sandbox::ShutdownReport`]) rather than stopping at the
/// first one, per the cleanup-always-runs rule.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("CA pool: {0}")]
    Ca(#[from] matchlock_ca::CaError),

    #[error("proxy: {0}")]
    Proxy(#[from] matchlock_proxy::ProxyError),

    #[error("VFS I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("construction failed and was rolled back: {0}")]
    ConstructionFailed(anyhow::Error),

    #[error("shutdown completed with failed cleanup step(s): {0}")]
    ShutdownJoined(anyhow::Error),

    #[error("sandbox is not in a phase that allows this operation: {0}")]
    InvalidPhase(String),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
