//! Accept loop and per-connection dispatch. The listener transport is
//! abstracted behind [`Transport`] so the dispatcher doesn't care
//! whether it's running over a Unix socket (tests, macOS vsock
//! listener) or a vsock port exposed by the VMM.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::frame::{read_frame, write_frame};

/// A duplex byte stream a connection is served over.
pub trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

/// Accepts new connections. Implementors own the actual listen socket;
/// the server only ever calls `accept`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn accept(&self) -> std::io::Result<Box<dyn Conn>>;
}

/// Runs the accept loop: each connection is handled on its own task,
/// reading and dispatching requests positionally — the server does not
/// serialize requests within a connection, since the protocol relies
/// on the client matching responses by order of write, not by a
/// request id.
pub async fn serve(transport: Arc<dyn Transport>, dispatcher: Arc<Dispatcher>) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    serve_connection(conn, dispatcher).await;
                });
            }
            Err(err) => {
                warn!(error = %err, "VFS transport accept failed");
            }
        }
    }
}

async fn serve_connection(mut conn: Box<dyn Conn>, dispatcher: Arc<Dispatcher>) {
    loop {
        let request = match read_frame(&mut conn).await {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "VFS connection closed or framing error");
                return;
            }
        };

        let response = dispatcher.dispatch(request).await;
        if write_frame(&mut conn, &response).await.is_err() {
            return;
        }
    }
}

#[cfg(unix)]
pub mod unix {
    use std::path::{Path, PathBuf};

    use tokio::net::UnixListener;

    use super::{Conn, Transport};

    pub struct UnixTransport {
        listener: UnixListener,
        path: PathBuf,
    }

    impl UnixTransport {
        pub fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
            let path = path.as_ref().to_path_buf();
            let _ = std::fs::remove_file(&path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let listener = UnixListener::bind(&path)?;
            Ok(Self { listener, path })
        }
    }

    impl Drop for UnixTransport {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    #[async_trait::async_trait]
    impl Transport for UnixTransport {
        async fn accept(&self) -> std::io::Result<Box<dyn Conn>> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(Box::new(stream))
        }
    }
}

#[cfg(target_os = "linux")]
pub mod vsock {
    use tokio_vsock::{VsockAddr, VsockListener};

    use super::{Conn, Transport};

    /// Listens on a vsock port exposed by the VMM. `cid` is typically
    /// `VMADDR_CID_ANY` on the host side of a guest-initiated
    /// connection.
    pub struct VsockTransport {
        listener: VsockListener,
    }

    impl VsockTransport {
        pub fn bind(cid: u32, port: u32) -> std::io::Result<Self> {
            let listener = VsockListener::bind(VsockAddr::new(cid, port))?;
            Ok(Self { listener })
        }
    }

    #[async_trait::async_trait]
    impl Transport for VsockTransport {
        async fn accept(&self) -> std::io::Result<Box<dyn Conn>> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(Box::new(stream))
        }
    }
}
