//! Forwards one already-policy-checked request to an upstream host,
//! reusing a pooled connection when one is available, and reports
//! whether the connection may be returned to the pool afterward.

use crate::dial;
use crate::error::ProxyError;
use crate::http_message::{has_connection_close, read_body, read_response_head, write_request, ResponseHead};
use crate::pool::ConnectionPool;

pub struct ForwardResult {
    pub head: ResponseHead,
    pub body: Vec<u8>,
    pub request_bytes: u64,
    pub response_bytes: u64,
    /// `true` if either side asked for the connection to close.
    pub close: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn forward_request(
    pool: &ConnectionPool,
    target_host: &str,
    target_port: u16,
    use_tls: bool,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Result<ForwardResult, ProxyError> {
    let key = format!("{target_host}:{target_port}:{use_tls}");

    let conn = match pool.take(&key).await {
        Some(conn) => conn,
        None => dial::dial(target_host, target_port, use_tls).await?,
    };

    let mut reader = tokio::io::BufReader::new(conn);
    write_request(&mut reader, method, path, headers, body).await?;

    let head = read_response_head(&mut reader).await?;
    let response_body = read_body(&mut reader, &head.headers).await?;
    let close = has_connection_close(headers) || has_connection_close(&head.headers);

    let conn = reader.into_inner();
    if !close {
        pool.put(&key, conn).await;
    }

    let request_bytes = body.len() as u64;
    let response_bytes = response_body.len() as u64;

    Ok(ForwardResult {
        head,
        body: response_body,
        request_bytes,
        response_bytes,
        close,
    })
}

/// Splits a `Host` header value into `(host, port)`, falling back to
/// `default_port` when no port is present.
#[must_use]
pub fn host_and_port(raw: &str, default_port: u16) -> (String, u16) {
    let host = matchlock_core::host::strip_port(raw);
    let port = raw
        .rsplit_once(':')
        .and_then(|(_, p)| p.parse::<u16>().ok())
        .unwrap_or(default_port);
    (host.to_string(), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port_falls_back_to_default() {
        assert_eq!(host_and_port("api.example.com", 80), ("api.example.com".to_string(), 80));
        assert_eq!(host_and_port("api.example.com:8080", 80), ("api.example.com".to_string(), 8080));
    }
}
