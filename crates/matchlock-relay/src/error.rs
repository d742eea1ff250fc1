use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("frame body too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error("unknown frame type byte: {0}")]
    UnknownMessageType(u8),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exit code frame must be exactly 4 bytes, got {0}")]
    MalformedExitFrame(usize),

    #[error("the guest does not support interactive exec")]
    InteractiveUnsupported,

    #[error("guest stream error: {0}")]
    Guest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
