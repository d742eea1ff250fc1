//! A duplex upstream connection, plain TCP or TLS-wrapped, type-erased
//! so the pool and forwarding logic don't need to care which.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait UpstreamConn: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> UpstreamConn for T {}
