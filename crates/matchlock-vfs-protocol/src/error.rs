use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame body too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error("CBOR decode error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("CBOR encode error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
