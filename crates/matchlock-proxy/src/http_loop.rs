//! Plain HTTP accept loop (spec component 4.6, HTTP half): one task per
//! accepted connection, serving requests off it until either side asks
//! to close.

use std::sync::Arc;
use std::time::Instant;

use matchlock_events::EventBus;
use matchlock_policy::{HostResolver, PolicyEngine, ProxyRequest};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::forward::{forward_request, host_and_port};
use crate::http_message::{has_connection_close, header, read_body, read_request_head, write_response};
use crate::pool::ConnectionPool;
use crate::respond::{emit_network_event, write_bad_gateway, write_blocked};

pub async fn serve_http(
    listener: TcpListener,
    policy: Arc<PolicyEngine>,
    pool: Arc<ConnectionPool>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let policy = Arc::clone(&policy);
                let pool = Arc::clone(&pool);
                let events = events.clone();
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    handle_connection(stream, policy, pool, events, resolver).await;
                });
            }
            Err(err) => warn!(error = %err, "HTTP accept failed"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    policy: Arc<PolicyEngine>,
    pool: Arc<ConnectionPool>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    let mut reader = BufReader::new(stream);

    loop {
        let head = match read_request_head(&mut reader).await {
            Ok(Some(head)) => head,
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "HTTP connection closed or framing error");
                return;
            }
        };

        let body = match read_body(&mut reader, &head.headers).await {
            Ok(body) => body,
            Err(err) => {
                debug!(error = %err, "failed to read HTTP request body");
                return;
            }
        };

        let host_header = header(&head.headers, "Host").unwrap_or_default().to_string();
        let (effective_host, port) = host_and_port(&host_header, 80);
        let url = format!("http://{host_header}{}", head.path);

        if !policy.is_host_allowed(&effective_host, resolver.as_ref()).await {
            emit_network_event(&events, &head.method, &url, &effective_host, None, 0, 0, 0, true, Some("host not allowed".into()));
            write_blocked(reader.get_mut(), "host not allowed").await;
            return;
        }

        let mut proxy_req = ProxyRequest::new(head.method.clone(), head.path.clone());
        proxy_req.headers = head.headers.clone();
        proxy_req.body = body;

        if policy.on_request(&mut proxy_req, &effective_host).is_err() {
            emit_network_event(&events, &head.method, &url, &effective_host, None, 0, 0, 0, true, Some("secret leak".into()));
            write_blocked(reader.get_mut(), "secret placeholder sent to unauthorized host").await;
            return;
        }

        let started = Instant::now();
        match forward_request(&pool, &effective_host, port, false, &proxy_req.method, &proxy_req.path, &proxy_req.headers, &proxy_req.body).await {
            Ok(result) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                emit_network_event(
                    &events,
                    &head.method,
                    &url,
                    &effective_host,
                    Some(result.head.status),
                    result.request_bytes,
                    result.response_bytes,
                    duration_ms,
                    false,
                    None,
                );

                if write_response(reader.get_mut(), result.head.status, &result.head.reason, &result.head.headers, &result.body)
                    .await
                    .is_err()
                {
                    return;
                }

                if result.close || has_connection_close(&head.headers) {
                    return;
                }
            }
            Err(err) => {
                warn!(host = effective_host, error = %err, "HTTP upstream forward failed");
                write_bad_gateway(reader.get_mut()).await;
                return;
            }
        }
    }
}
