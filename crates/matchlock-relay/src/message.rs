//! The nine message types of the exec/port-forward wire protocol, and
//! conversions to and from the raw framed bytes in [`crate::frame`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::RelayError;
use crate::frame::{read_raw_frame, write_raw_frame, RawFrame};

pub(crate) const TYPE_EXEC: u8 = 1;
pub(crate) const TYPE_EXEC_RESULT: u8 = 2;
pub(crate) const TYPE_EXEC_INTERACTIVE: u8 = 3;
pub(crate) const TYPE_STDOUT: u8 = 4;
pub(crate) const TYPE_STDERR: u8 = 5;
pub(crate) const TYPE_STDIN: u8 = 6;
pub(crate) const TYPE_EXIT: u8 = 7;
pub(crate) const TYPE_EXEC_PIPE: u8 = 8;
pub(crate) const TYPE_PORT_FORWARD: u8 = 9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecResult {
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecInteractiveRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortForwardRequest {
    pub remote_port: u16,
}

/// One decoded message off (or onto) the wire. Stdout/Stderr/Stdin carry
/// raw bytes; an empty `Stdin` payload is the client's EOF marker, not a
/// zero-length write.
#[derive(Debug, Clone)]
pub enum Message {
    Exec(ExecRequest),
    ExecResult(ExecResult),
    ExecInteractive(ExecInteractiveRequest),
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Stdin(Vec<u8>),
    Exit(i32),
    ExecPipe(ExecRequest),
    PortForward(PortForwardRequest),
}

impl Message {
    fn from_raw(frame: RawFrame) -> Result<Self, RelayError> {
        match frame.msg_type {
            TYPE_EXEC => Ok(Message::Exec(serde_json::from_slice(&frame.payload)?)),
            TYPE_EXEC_RESULT => Ok(Message::ExecResult(serde_json::from_slice(&frame.payload)?)),
            TYPE_EXEC_INTERACTIVE => Ok(Message::ExecInteractive(serde_json::from_slice(&frame.payload)?)),
            TYPE_STDOUT => Ok(Message::Stdout(frame.payload)),
            TYPE_STDERR => Ok(Message::Stderr(frame.payload)),
            TYPE_STDIN => Ok(Message::Stdin(frame.payload)),
            TYPE_EXIT => {
                let bytes: [u8; 4] = frame
                    .payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| RelayError::MalformedExitFrame(frame.payload.len()))?;
                Ok(Message::Exit(i32::from_be_bytes(bytes)))
            }
            TYPE_EXEC_PIPE => Ok(Message::ExecPipe(serde_json::from_slice(&frame.payload)?)),
            TYPE_PORT_FORWARD => Ok(Message::PortForward(serde_json::from_slice(&frame.payload)?)),
            other => Err(RelayError::UnknownMessageType(other)),
        }
    }

    fn to_raw(&self) -> Result<(u8, Vec<u8>), RelayError> {
        Ok(match self {
            Message::Exec(req) => (TYPE_EXEC, serde_json::to_vec(req)?),
            Message::ExecResult(res) => (TYPE_EXEC_RESULT, serde_json::to_vec(res)?),
            Message::ExecInteractive(req) => (TYPE_EXEC_INTERACTIVE, serde_json::to_vec(req)?),
            Message::Stdout(bytes) => (TYPE_STDOUT, bytes.clone()),
            Message::Stderr(bytes) => (TYPE_STDERR, bytes.clone()),
            Message::Stdin(bytes) => (TYPE_STDIN, bytes.clone()),
            Message::Exit(code) => (TYPE_EXIT, code.to_be_bytes().to_vec()),
            Message::ExecPipe(req) => (TYPE_EXEC_PIPE, serde_json::to_vec(req)?),
            Message::PortForward(req) => (TYPE_PORT_FORWARD, serde_json::to_vec(req)?),
        })
    }
}

pub async fn read_message<R>(reader: &mut R) -> Result<Message, RelayError>
where
    R: AsyncRead + Unpin,
{
    let frame = read_raw_frame(reader).await?;
    Message::from_raw(frame)
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    let (msg_type, payload) = message.to_raw()?;
    write_raw_frame(writer, msg_type, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_an_exec_request() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let message = Message::Exec(ExecRequest {
            command: "echo hi".to_string(),
            working_dir: Some("/tmp".to_string()),
            user: None,
        });
        write_message(&mut client, &message).await.unwrap();

        match read_message(&mut server).await.unwrap() {
            Message::Exec(req) => {
                assert_eq!(req.command, "echo hi");
                assert_eq!(req.working_dir.as_deref(), Some("/tmp"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_stdin_decodes_as_the_eof_marker() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_message(&mut client, &Message::Stdin(Vec::new())).await.unwrap();

        match read_message(&mut server).await.unwrap() {
            Message::Stdin(bytes) => assert!(bytes.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exit_code_round_trips_as_four_big_endian_bytes() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_message(&mut client, &Message::Exit(-1)).await.unwrap();

        match read_message(&mut server).await.unwrap() {
            Message::Exit(code) => assert_eq!(code, -1),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_exit_frame_is_rejected() {
        use crate::frame::write_raw_frame;

        let (mut client, mut server) = tokio::io::duplex(64);
        write_raw_frame(&mut client, TYPE_EXIT, b"ab").await.unwrap();

        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedExitFrame(2)));
    }
}
