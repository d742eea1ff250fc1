//! Accept loop for the relay's Unix domain socket (spec component 4.7):
//! one task per accepted connection, each driven by [`crate::session`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;
use tracing::warn;

use crate::machine::Machine;
use crate::session::run_session;

/// Owns the relay's listening socket; removes the socket file on drop.
pub struct RelayServer {
    listener: UnixListener,
    path: PathBuf,
}

impl RelayServer {
    pub fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Accepts connections until the listener itself errors out; each
    /// accepted connection becomes one relay session.
    pub async fn serve(self, machine: Arc<dyn Machine>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let machine = Arc::clone(&machine);
                    tokio::spawn(async move {
                        run_session(stream, machine).await;
                    });
                }
                Err(err) => warn!(error = %err, "relay accept failed"),
            }
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::UnixStream;

    use super::*;
    use crate::machine::test_support::LoopbackMachine;
    use crate::message::{read_message, write_message, ExecRequest, ExecResult, Message};

    #[tokio::test]
    async fn serves_one_exec_session_over_a_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("relay.sock");

        let (guest_side, relay_side) = tokio::io::duplex(4096);
        let machine: Arc<dyn Machine> = Arc::new(LoopbackMachine::new(relay_side, false));

        let fake_guest_agent = tokio::spawn(async move {
            let mut guest = guest_side;
            match read_message(&mut guest).await.unwrap() {
                Message::Exec(req) => assert_eq!(req.command, "true"),
                other => panic!("unexpected: {other:?}"),
            }
            write_message(
                &mut guest,
                &Message::ExecResult(ExecResult {
                    exit_code: 0,
                    stdout: None,
                    stderr: None,
                    error: None,
                }),
            )
            .await
            .unwrap();
        });

        let server = RelayServer::bind(&socket_path).unwrap();
        tokio::spawn(server.serve(machine));

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        write_message(
            &mut client,
            &Message::Exec(ExecRequest {
                command: "true".to_string(),
                working_dir: None,
                user: None,
            }),
        )
        .await
        .unwrap();

        match read_message(&mut client).await.unwrap() {
            Message::ExecResult(result) => assert_eq!(result.exit_code, 0),
            other => panic!("unexpected: {other:?}"),
        }

        fake_guest_agent.await.unwrap();
    }
}
