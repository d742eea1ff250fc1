//! One accepted relay connection. Reads the opening message to learn
//! which of the four session kinds (`Exec`, `ExecInteractive`,
//! `ExecPipe`, `PortForward`) the client wants, then drives it to
//! completion.
//!
//! The guest-agent wire protocol carried over the vsock stream this
//! session opens is out of scope; this crate frames its own requests
//! and results onto that stream using the same [`crate::message`] wire
//! format it speaks to the client, which keeps the forwarding logic
//! symmetric and lets tests stand in a fake guest agent without a
//! second protocol.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::machine::{GuestStream, Machine, GUEST_EXEC_PORT};
use crate::message::{
    read_message, write_message, ExecInteractiveRequest, ExecRequest, ExecResult, Message, PortForwardRequest,
};

/// Serializes writes onto a shared connection so that one framed
/// message (header plus body) is never interleaved with another, even
/// when multiple tasks are producing frames for the same session.
pub struct FrameWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W: tokio::io::AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: Arc::new(Mutex::new(writer)) }
    }

    pub async fn send(&self, message: &Message) -> Result<(), RelayError> {
        let mut guard = self.inner.lock().await;
        write_message(&mut *guard, message).await
    }
}

/// Drives one accepted connection to completion, dispatching on its
/// first message.
pub async fn run_session<S>(stream: S, machine: Arc<dyn Machine>)
where
    S: GuestStream + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);
    let writer = FrameWriter::new(write_half);

    let opening = match read_message(&mut read_half).await {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, "relay session closed before an opening message arrived");
            return;
        }
    };

    let result = match opening {
        Message::Exec(req) => run_exec(machine, req).await.map(|res| {
            Some(Message::ExecResult(res))
        }),
        Message::ExecPipe(req) => run_exec_pipe(&mut read_half, &writer, machine, req).await.map(|()| None),
        Message::ExecInteractive(req) => {
            run_exec_interactive(&mut read_half, &writer, machine, req).await.map(|()| None)
        }
        Message::PortForward(req) => run_port_forward(&mut read_half, &writer, machine, req).await.map(|()| None),
        other => {
            warn!(?other, "relay session opened with an unexpected message type");
            return;
        }
    };

    match result {
        Ok(Some(final_message)) => {
            let _ = writer.send(&final_message).await;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "relay session ended with an error"),
    }
}

async fn open_guest_exec_stream(machine: &Arc<dyn Machine>) -> Result<Box<dyn GuestStream>, RelayError> {
    machine
        .open_stream(GUEST_EXEC_PORT)
        .await
        .map_err(|err| RelayError::Guest(err.to_string()))
}

/// `Exec`: one request, one result, no streaming stdio.
async fn run_exec(machine: Arc<dyn Machine>, req: ExecRequest) -> Result<ExecResult, RelayError> {
    let mut guest = open_guest_exec_stream(&machine).await?;
    write_message(&mut guest, &Message::Exec(req)).await?;

    match read_message(&mut guest).await? {
        Message::ExecResult(result) => Ok(result),
        other => {
            warn!(?other, "guest agent replied to Exec with an unexpected message");
            Ok(ExecResult {
                exit_code: -1,
                stdout: None,
                stderr: None,
                error: Some("guest agent returned an unexpected reply".to_string()),
            })
        }
    }
}

/// `ExecPipe`: streams stdio both ways via Stdout/Stderr/Stdin and ends
/// with an `Exit` frame. If the client disconnects, the guest stream is
/// dropped, which the guest agent observes as the process being
/// terminated.
async fn run_exec_pipe<R>(
    client_reader: &mut R,
    client_writer: &FrameWriter<impl tokio::io::AsyncWrite + Unpin + Send + 'static>,
    machine: Arc<dyn Machine>,
    req: ExecRequest,
) -> Result<(), RelayError>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let guest = open_guest_exec_stream(&machine).await?;
    let (mut guest_read, mut guest_write) = tokio::io::split(guest);

    write_message(&mut guest_write, &Message::ExecPipe(req)).await?;

    let to_guest = async {
        loop {
            match read_message(client_reader).await {
                Ok(Message::Stdin(bytes)) if bytes.is_empty() => break,
                Ok(Message::Stdin(bytes)) => {
                    if write_message(&mut guest_write, &Message::Stdin(bytes)).await.is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    };

    let to_client = async {
        loop {
            match read_message(&mut guest_read).await {
                Ok(message @ (Message::Stdout(_) | Message::Stderr(_))) => {
                    if client_writer.send(&message).await.is_err() {
                        return;
                    }
                }
                Ok(Message::Exit(code)) => {
                    let _ = client_writer.send(&Message::Exit(code)).await;
                    return;
                }
                _ => return,
            }
        }
    };

    tokio::select! {
        () = to_guest => {}
        () = to_client => {}
    }

    Ok(())
}

/// `ExecInteractive`: like `ExecPipe` but only offered when the machine
/// reports PTY support. There is no wire message for a mid-session
/// resize; `rows`/`cols` are fixed for the session's lifetime.
async fn run_exec_interactive<R>(
    client_reader: &mut R,
    client_writer: &FrameWriter<impl tokio::io::AsyncWrite + Unpin + Send + 'static>,
    machine: Arc<dyn Machine>,
    req: ExecInteractiveRequest,
) -> Result<(), RelayError>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    if !machine.supports_interactive() {
        return Err(RelayError::InteractiveUnsupported);
    }

    let guest = open_guest_exec_stream(&machine).await?;
    let (mut guest_read, mut guest_write) = tokio::io::split(guest);

    write_message(&mut guest_write, &Message::ExecInteractive(req)).await?;

    let to_guest = async {
        loop {
            match read_message(client_reader).await {
                Ok(Message::Stdin(bytes)) if bytes.is_empty() => break,
                Ok(Message::Stdin(bytes)) => {
                    if write_message(&mut guest_write, &Message::Stdin(bytes)).await.is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    };

    let to_client = async {
        loop {
            match read_message(&mut guest_read).await {
                Ok(message @ (Message::Stdout(_) | Message::Stderr(_))) => {
                    if client_writer.send(&message).await.is_err() {
                        return;
                    }
                }
                Ok(Message::Exit(code)) => {
                    let _ = client_writer.send(&Message::Exit(code)).await;
                    return;
                }
                _ => return,
            }
        }
    };

    tokio::select! {
        () = to_guest => {}
        () = to_client => {}
    }

    Ok(())
}

/// `PortForward`: ferries raw TCP payload both ways. An empty `Stdin`
/// frame stops the client→guest relay but must not half-close the
/// guest stream — half-close is not reliably preserved over the
/// host-guest transport — so the session waits for the guest side's own
/// natural EOF before sending `Exit`.
async fn run_port_forward<R>(
    client_reader: &mut R,
    client_writer: &FrameWriter<impl tokio::io::AsyncWrite + Unpin + Send + 'static>,
    machine: Arc<dyn Machine>,
    req: PortForwardRequest,
) -> Result<(), RelayError>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let guest = open_guest_exec_stream(&machine).await?;
    let (mut guest_read, mut guest_write) = tokio::io::split(guest);

    write_message(&mut guest_write, &Message::PortForward(req)).await?;

    let to_guest = async {
        loop {
            match read_message(client_reader).await {
                Ok(Message::Stdin(bytes)) if bytes.is_empty() => {
                    // Client signaled EOF; leave the guest write half open.
                    std::future::pending::<()>().await;
                }
                Ok(Message::Stdin(bytes)) => {
                    if guest_write.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                _ => return,
            }
        }
    };

    let to_client = async {
        let mut buf = vec![0_u8; 16 * 1024];
        loop {
            match guest_read.read(&mut buf).await {
                Ok(0) => {
                    let _ = client_writer.send(&Message::Exit(0)).await;
                    return;
                }
                Ok(n) => {
                    if client_writer.send(&Message::Stdout(buf[..n].to_vec())).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = client_writer.send(&Message::Stderr(err.to_string().into_bytes())).await;
                    let _ = client_writer.send(&Message::Exit(1)).await;
                    return;
                }
            }
        }
    };

    tokio::select! {
        () = to_guest => {}
        () = to_client => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::test_support::LoopbackMachine;

    #[tokio::test]
    async fn exec_forwards_request_and_returns_result() {
        let (guest_side, relay_side) = tokio::io::duplex(4096);
        let machine: Arc<dyn Machine> = Arc::new(LoopbackMachine::new(relay_side, false));

        let fake_guest_agent = tokio::spawn(async move {
            let mut guest = guest_side;
            match read_message(&mut guest).await.unwrap() {
                Message::Exec(req) => assert_eq!(req.command, "echo hi"),
                other => panic!("unexpected: {other:?}"),
            }
            write_message(
                &mut guest,
                &Message::ExecResult(ExecResult {
                    exit_code: 0,
                    stdout: Some("hi\n".to_string()),
                    stderr: None,
                    error: None,
                }),
            )
            .await
            .unwrap();
        });

        let (client_side, relay_client_side) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(relay_client_side, machine));

        let mut client = client_side;
        write_message(
            &mut client,
            &Message::Exec(ExecRequest {
                command: "echo hi".to_string(),
                working_dir: None,
                user: None,
            }),
        )
        .await
        .unwrap();

        match read_message(&mut client).await.unwrap() {
            Message::ExecResult(result) => {
                assert_eq!(result.exit_code, 0);
                assert_eq!(result.stdout.as_deref(), Some("hi\n"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        fake_guest_agent.await.unwrap();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn exec_interactive_without_pty_support_is_rejected() {
        let (_guest_side, relay_side) = tokio::io::duplex(64);
        let machine: Arc<dyn Machine> = Arc::new(LoopbackMachine::new(relay_side, false));

        let (client_side, relay_client_side) = tokio::io::duplex(4096);
        tokio::spawn(run_session(relay_client_side, machine));

        let mut client = client_side;
        write_message(
            &mut client,
            &Message::ExecInteractive(ExecInteractiveRequest {
                command: "bash".to_string(),
                working_dir: None,
                user: None,
                rows: 24,
                cols: 80,
            }),
        )
        .await
        .unwrap();

        // The session rejects the request internally and closes without
        // replying; the client observes EOF.
        let mut buf = [0_u8; 1];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn port_forward_ferries_bytes_and_exits_on_guest_eof() {
        let (guest_side, relay_side) = tokio::io::duplex(4096);
        let machine: Arc<dyn Machine> = Arc::new(LoopbackMachine::new(relay_side, false));

        let fake_guest_agent = tokio::spawn(async move {
            let mut guest = guest_side;
            match read_message(&mut guest).await.unwrap() {
                Message::PortForward(req) => assert_eq!(req.remote_port, 9999),
                other => panic!("unexpected: {other:?}"),
            }
            let mut buf = vec![0_u8; 16];
            let n = guest.read(&mut buf).await.unwrap();
            guest.write_all(&buf[..n]).await.unwrap();
            // Drop here, simulating the guest-side connection closing.
        });

        let (client_side, relay_client_side) = tokio::io::duplex(4096);
        let session = tokio::spawn(run_session(relay_client_side, machine));

        let mut client = client_side;
        write_message(
            &mut client,
            &Message::PortForward(PortForwardRequest { remote_port: 9999 }),
        )
        .await
        .unwrap();
        write_message(&mut client, &Message::Stdin(b"ping".to_vec())).await.unwrap();

        match read_message(&mut client).await.unwrap() {
            Message::Stdout(bytes) => assert_eq!(bytes, b"ping"),
            other => panic!("unexpected: {other:?}"),
        }

        match read_message(&mut client).await.unwrap() {
            Message::Exit(code) => assert_eq!(code, 0),
            other => panic!("unexpected: {other:?}"),
        }

        fake_guest_agent.await.unwrap();
        session.await.unwrap();
    }
}
