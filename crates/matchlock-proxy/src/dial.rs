//! Dials a real upstream host, optionally wrapping the connection in a
//! client TLS handshake.

use std::time::Duration;

use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::conn::UpstreamConn;
use crate::error::ProxyError;
use crate::tls;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn dial(host: &str, port: u16, use_tls: bool) -> Result<Box<dyn UpstreamConn>, ProxyError> {
    let tcp = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ProxyError::UpstreamTimeout)??;

    if !use_tls {
        return Ok(Box::new(tcp));
    }

    let config = tls::client_config()?;
    let connector = TlsConnector::from(config);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ProxyError::Tls(format!("invalid upstream server name: {host}")))?;

    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|err| ProxyError::Tls(err.to_string()))?;
    Ok(Box::new(stream))
}
