//! Small helpers shared between the HTTP and HTTPS accept loops: the
//! error responses a blocked or failed request gets, and the network
//! event each conversation emits regardless of outcome.

use matchlock_events::{EventBus, MatchlockEvent, NetworkEvent};
use tokio::io::AsyncWrite;

use crate::http_message::write_response;

pub async fn write_blocked<W: AsyncWrite + Unpin>(writer: &mut W, reason: &str) {
    let body = format!("blocked by policy: {reason}\n").into_bytes();
    let headers = [("Connection".to_string(), "close".to_string())];
    let _ = write_response(writer, 403, "Forbidden", &headers, &body).await;
}

pub async fn write_bad_gateway<W: AsyncWrite + Unpin>(writer: &mut W) {
    let headers = [("Connection".to_string(), "close".to_string())];
    let _ = write_response(writer, 502, "Bad Gateway", &headers, b"upstream error\n").await;
}

#[allow(clippy::too_many_arguments)]
pub fn emit_network_event(
    events: &EventBus,
    method: &str,
    url: &str,
    host: &str,
    status_code: Option<u16>,
    request_bytes: u64,
    response_bytes: u64,
    duration_ms: u64,
    blocked: bool,
    block_reason: Option<String>,
) {
    events.publish(MatchlockEvent::network(NetworkEvent {
        method: method.to_string(),
        url: url.to_string(),
        host: host.to_string(),
        status_code,
        request_bytes,
        response_bytes,
        duration_ms,
        blocked,
        block_reason,
    }));
}
