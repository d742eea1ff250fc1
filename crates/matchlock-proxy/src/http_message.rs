//! Minimal HTTP/1.1 framing: enough to read one request or response off a
//! byte stream, buffer its body, and write it back out. Not a general
//! purpose HTTP library — the proxy only ever needs to look at headers
//! closely enough to route and inject secrets, then re-serialize.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;

const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 64;
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn has_connection_close(headers: &[(String, String)]) -> bool {
    header(headers, "Connection").is_some_and(|v| v.eq_ignore_ascii_case("close"))
}

/// Reads the request line and headers. Returns `Ok(None)` on a clean EOF
/// before any bytes arrive (idle keep-alive connection closing), and an
/// error on a partial or malformed head.
pub async fn read_request_head<R>(reader: &mut R) -> Result<Option<RequestHead>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(raw) = read_head_bytes(reader).await? else {
        return Ok(None);
    };

    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut header_buf);
    let status = req
        .parse(&raw)
        .map_err(|err| ProxyError::Malformed(err.to_string()))?;
    if status.is_partial() {
        return Err(ProxyError::Malformed("incomplete request head".into()));
    }

    let method = req
        .method
        .ok_or_else(|| ProxyError::Malformed("missing method".into()))?
        .to_string();
    let path = req
        .path
        .ok_or_else(|| ProxyError::Malformed("missing path".into()))?
        .to_string();
    let headers = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    Ok(Some(RequestHead { method, path, headers }))
}

pub async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let raw = read_head_bytes(reader)
        .await?
        .ok_or_else(|| ProxyError::Malformed("upstream closed before sending a response".into()))?;

    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut header_buf);
    let status = resp
        .parse(&raw)
        .map_err(|err| ProxyError::Malformed(err.to_string()))?;
    if status.is_partial() {
        return Err(ProxyError::Malformed("incomplete response head".into()));
    }

    let code = resp.code.ok_or_else(|| ProxyError::Malformed("missing status code".into()))?;
    let reason = resp.reason.unwrap_or("").to_string();
    let headers = resp
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    Ok(ResponseHead { status: code, reason, headers })
}

/// Reads bytes up to and including the blank line terminating an
/// HTTP head. Returns `None` if the stream closes before a single byte
/// arrives.
async fn read_head_bytes<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    loop {
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(ProxyError::UpstreamConnect)?;
        if n == 0 {
            return if raw.is_empty() {
                Ok(None)
            } else {
                Err(ProxyError::Malformed("connection closed mid-head".into()))
            };
        }
        raw.extend_from_slice(&line);
        if raw.len() > MAX_HEAD_BYTES {
            return Err(ProxyError::Malformed("head exceeds maximum size".into()));
        }
        if line == b"\r\n" || line == b"\n" {
            break;
        }
    }
    Ok(Some(raw))
}

/// Reads the body following a head: chunked decoding if
/// `Transfer-Encoding: chunked` is present, otherwise `Content-Length`
/// bytes (0 if absent).
pub async fn read_body<R>(reader: &mut R, headers: &[(String, String)]) -> Result<Vec<u8>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    if header(headers, "Transfer-Encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        return read_chunked_body(reader).await;
    }

    let len = header(headers, "Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if len > MAX_BODY_BYTES {
        return Err(ProxyError::Malformed("body exceeds maximum size".into()));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(ProxyError::UpstreamConnect)?;
    Ok(body)
}

async fn read_chunked_body<R>(reader: &mut R) -> Result<Vec<u8>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut size_line = Vec::new();
        reader
            .read_until(b'\n', &mut size_line)
            .await
            .map_err(ProxyError::UpstreamConnect)?;
        let size_str = std::str::from_utf8(&size_line)
            .map_err(|_| ProxyError::Malformed("non-UTF8 chunk size line".into()))?
            .trim();
        let size_str = size_str.split(';').next().unwrap_or(size_str);
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| ProxyError::Malformed("invalid chunk size".into()))?;

        if size == 0 {
            // Trailing headers (if any) end with a blank line; discard.
            loop {
                let mut trailer = Vec::new();
                reader.read_until(b'\n', &mut trailer).await.map_err(ProxyError::UpstreamConnect)?;
                if trailer == b"\r\n" || trailer == b"\n" || trailer.is_empty() {
                    break;
                }
            }
            break;
        }

        if body.len().saturating_add(size) > MAX_BODY_BYTES {
            return Err(ProxyError::Malformed("chunked body exceeds maximum size".into()));
        }

        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).await.map_err(ProxyError::UpstreamConnect)?;
        body.extend_from_slice(&chunk);

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await.map_err(ProxyError::UpstreamConnect)?;
    }
    Ok(body)
}

pub async fn write_request<W>(
    writer: &mut W,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Result<(), ProxyError>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("{method} {path} HTTP/1.1\r\n");
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await.map_err(ProxyError::UpstreamConnect)?;
    writer.write_all(body).await.map_err(ProxyError::UpstreamConnect)?;
    writer.flush().await.map_err(ProxyError::UpstreamConnect)?;
    Ok(())
}

/// Writes a response, rewriting `Transfer-Encoding: chunked` to a
/// `Content-Length` matching the (already fully buffered) body.
pub async fn write_response<W>(
    writer: &mut W,
    status: u16,
    reason: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("Transfer-Encoding") || name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub fn simple_error_response(status: u16, reason: &str) -> (u16, String, Vec<(String, String)>, Vec<u8>) {
    let body = format!("{status} {reason}\n").into_bytes();
    let headers = vec![("Connection".to_string(), "close".to_string())];
    (status, reason.to_string(), headers, body)
}

/// Drains a full request or response off a buffered reader wrapping an
/// already-read prefix, used by tests that build a stream from a byte
/// buffer. Re-exported for readability at call sites.
pub fn buf_reader<R: AsyncRead>(inner: R) -> tokio::io::BufReader<R> {
    tokio::io::BufReader::new(inner)
}
