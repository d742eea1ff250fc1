//! Raw TCP passthrough loop (spec component 4.6, third loop): no
//! layer-7 parsing, gated only by the host allowlist applied to the
//! connection's destination.

use std::sync::Arc;
use std::time::Duration;

use matchlock_events::{EventBus, MatchlockEvent, NetworkEvent};
use matchlock_policy::{HostResolver, PolicyEngine};
use tokio::io::AsyncWriteExt as _;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::dial::DIAL_TIMEOUT;

/// Grace period given to the still-open half of a passthrough pair once
/// the other half has closed, before it is forced shut.
const HALF_CLOSE_DEADLINE: Duration = Duration::from_secs(10);

pub async fn serve_passthrough(
    listener: TcpListener,
    destination_host: String,
    destination_port: u16,
    policy: Arc<PolicyEngine>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let policy = Arc::clone(&policy);
                let events = events.clone();
                let resolver = Arc::clone(&resolver);
                let host = destination_host.clone();
                tokio::spawn(async move {
                    handle_connection(stream, host, destination_port, policy, events, resolver).await;
                });
            }
            Err(err) => warn!(error = %err, "passthrough accept failed"),
        }
    }
}

async fn handle_connection(
    mut client: TcpStream,
    host: String,
    port: u16,
    policy: Arc<PolicyEngine>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    if !policy.is_host_allowed(&host, resolver.as_ref()).await {
        events.publish(MatchlockEvent::network(NetworkEvent {
            method: "TCP".to_string(),
            url: format!("tcp://{host}:{port}"),
            host,
            status_code: None,
            request_bytes: 0,
            response_bytes: 0,
            duration_ms: 0,
            blocked: true,
            block_reason: Some("host not allowed".into()),
        }));
        return;
    }

    let upstream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await;
    let mut upstream = match upstream {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            debug!(host, error = %err, "passthrough upstream connect failed");
            return;
        }
        Err(_) => {
            debug!(host, "passthrough upstream connect timed out");
            return;
        }
    };

    let (mut client_r, mut client_w) = client.split();
    let (mut upstream_r, mut upstream_w) = upstream.split();

    let client_to_upstream = async {
        let _ = tokio::io::copy(&mut client_r, &mut upstream_w).await;
        let _ = upstream_w.shutdown().await;
    };
    let upstream_to_client = async {
        let _ = tokio::io::copy(&mut upstream_r, &mut client_w).await;
        let _ = client_w.shutdown().await;
    };
    tokio::pin!(client_to_upstream, upstream_to_client);

    // Run both halves until one finishes, then give the other a bounded
    // grace period to flush and close on its own before returning.
    tokio::select! {
        () = &mut client_to_upstream => {
            let _ = tokio::time::timeout(HALF_CLOSE_DEADLINE, upstream_to_client).await;
        }
        () = &mut upstream_to_client => {
            let _ = tokio::time::timeout(HALF_CLOSE_DEADLINE, client_to_upstream).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use matchlock_events::EventBus;
    use matchlock_policy::{PolicyEngine, SystemResolver};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn spawn_echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0_u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn allowed_destination_is_echoed_through() {
        let echo_port = spawn_echo_server().await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = listener.local_addr().unwrap().port();
        let policy = Arc::new(PolicyEngine::builder().allow_host("127.0.0.1").build());
        let (events, _rx) = EventBus::new();
        let resolver = Arc::new(SystemResolver);

        tokio::spawn(serve_passthrough(listener, "127.0.0.1".to_string(), echo_port, policy, events, resolver));

        let mut client = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut buf = vec![0_u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn disallowed_destination_closes_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = listener.local_addr().unwrap().port();
        let policy = Arc::new(PolicyEngine::builder().allow_host("only-this.example").build());
        let (events, _rx) = EventBus::new();
        let resolver = Arc::new(SystemResolver);

        tokio::spawn(serve_passthrough(listener, "127.0.0.1".to_string(), 1, policy, events, resolver));

        let mut client = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
        let mut buf = vec![0_u8; 4];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
