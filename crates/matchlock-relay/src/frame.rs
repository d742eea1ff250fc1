//! Raw framing for the exec/port-forward relay: a 1-byte message type
//! followed by a 4-byte big-endian length and that many payload bytes.
//! Unlike the VFS protocol's CBOR framing, payloads here are a mix of
//! JSON control messages and raw stdio/TCP bytes, so the frame layer
//! only moves bytes and leaves decoding to [`crate::message`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RelayError;

/// Guards against a malformed length prefix forcing a large allocation;
/// large enough for the biggest stdio/TCP chunk either side writes.
pub const MAX_FRAME_BYTES: u32 = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

pub async fn read_raw_frame<R>(reader: &mut R) -> Result<RawFrame, RelayError>
where
    R: AsyncRead + Unpin,
{
    let msg_type = reader.read_u8().await?;

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(RelayError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(RawFrame { msg_type, payload })
}

pub async fn write_raw_frame<W>(writer: &mut W, msg_type: u8, payload: &[u8]) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| RelayError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_BYTES {
        return Err(RelayError::FrameTooLarge(len));
    }

    writer.write_u8(msg_type).await?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame_through_a_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_raw_frame(&mut client, 6, b"hello").await.unwrap();

        let frame = read_raw_frame(&mut server).await.unwrap();
        assert_eq!(frame.msg_type, 6);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn empty_payload_round_trips_as_an_eof_marker() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_raw_frame(&mut client, 6, b"").await.unwrap();

        let frame = read_raw_frame(&mut server).await.unwrap();
        assert_eq!(frame.msg_type, 6);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[6]).await.unwrap();
        client
            .write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes())
            .await
            .unwrap();
        drop(client);

        let err = read_raw_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, RelayError::FrameTooLarge(_)));
    }
}
