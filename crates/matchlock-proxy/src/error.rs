use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed HTTP message: {0}")]
    Malformed(String),

    #[error("upstream connect failed: {0}")]
    UpstreamConnect(#[from] std::io::Error),

    #[error("upstream connect timed out")]
    UpstreamTimeout,

    #[error("TLS handshake failed: {0}")]
    Tls(String),
}
