//! The relay's view of the machine it serves: just enough surface to
//! open a guest-vsock stream and ask about interactive support. The
//! guest-agent wire protocol carried over that stream is a separate,
//! out-of-scope concern — the relay only needs a duplex byte stream.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream to the guest, type-erased so callers don't care
/// whether it is a real vsock connection or a loopback test double.
pub trait GuestStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> GuestStream for T {}

/// The well-known guest-agent vsock port the relay dials for exec.
pub const GUEST_EXEC_PORT: u32 = 10_000;

/// Abstraction over the microVM the relay is attached to. A concrete
/// implementation opens a real vsock connection; tests substitute a
/// loopback pair.
#[async_trait]
pub trait Machine: Send + Sync {
    /// Open a guest-vsock stream to the given port.
    async fn open_stream(&self, port: u32) -> std::io::Result<Box<dyn GuestStream>>;

    /// Whether this machine's guest agent can run a PTY-backed exec.
    fn supports_interactive(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{GuestStream, Machine};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;

    /// A `Machine` backed by an in-process duplex pair instead of a real
    /// vsock connection; the paired end is handed to a fake guest-agent
    /// task spawned by the test.
    pub struct LoopbackMachine {
        peer: Mutex<Option<DuplexStream>>,
        interactive: bool,
    }

    impl LoopbackMachine {
        pub fn new(guest_side: DuplexStream, interactive: bool) -> Self {
            Self {
                peer: Mutex::new(Some(guest_side)),
                interactive,
            }
        }
    }

    #[async_trait]
    impl Machine for LoopbackMachine {
        async fn open_stream(&self, _port: u32) -> std::io::Result<Box<dyn GuestStream>> {
            let stream = self
                .peer
                .lock()
                .expect("loopback machine mutex poisoned")
                .take()
                .expect("LoopbackMachine::open_stream called more than once");
            Ok(Box::new(stream))
        }

        fn supports_interactive(&self) -> bool {
            self.interactive
        }
    }
}
