//! Length-prefixed CBOR framing: a 4-byte big-endian length followed by
//! a CBOR-encoded body, mirroring the daemon socket's length-prefixed
//! JSON framing but with a CBOR body and a request/response shape
//! instead of one-way event fan-out.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Maximum frame body size, guarding against a malformed length prefix
/// forcing a large allocation.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    ciborium::de::from_reader(body.as_slice()).map_err(ProtocolError::from)
}

pub async fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut body = Vec::new();
    ciborium::ser::into_writer(value, &mut body).map_err(ProtocolError::from)?;
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge(u32::MAX))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
