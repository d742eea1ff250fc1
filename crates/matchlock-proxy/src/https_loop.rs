//! HTTPS accept loop (spec component 4.6, HTTPS half): terminate TLS
//! with a per-SNI leaf from the CA pool, then serve requests off the
//! decrypted stream exactly like the plain HTTP loop, with an extra
//! routing step that can redirect a request to a local backend.

use std::sync::Arc;
use std::time::Instant;

use matchlock_events::EventBus;
use matchlock_policy::{HostResolver, PolicyEngine, ProxyRequest, ROUTED_VIA_HEADER};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::forward::forward_request;
use crate::http_message::{has_connection_close, read_body, read_request_head, write_response};
use crate::pool::ConnectionPool;
use crate::respond::{emit_network_event, write_bad_gateway, write_blocked};

pub async fn serve_https(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    policy: Arc<PolicyEngine>,
    pool: Arc<ConnectionPool>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let acceptor = acceptor.clone();
                let policy = Arc::clone(&policy);
                let pool = Arc::clone(&pool);
                let events = events.clone();
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, policy, pool, events, resolver).await;
                });
            }
            Err(err) => warn!(error = %err, "HTTPS accept failed"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    policy: Arc<PolicyEngine>,
    pool: Arc<ConnectionPool>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(error = %err, "TLS handshake failed");
            return;
        }
    };

    let Some(sni_host) = tls_stream.get_ref().1.server_name().map(str::to_string) else {
        debug!("TLS handshake produced no SNI, closing");
        return;
    };

    if !policy.is_host_allowed(&sni_host, resolver.as_ref()).await {
        emit_network_event(&events, "CONNECT", &sni_host, &sni_host, None, 0, 0, 0, true, Some("host not allowed".into()));
        return;
    }

    let mut reader = BufReader::new(tls_stream);

    loop {
        let head = match read_request_head(&mut reader).await {
            Ok(Some(head)) => head,
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "HTTPS connection closed or framing error");
                return;
            }
        };

        let body = match read_body(&mut reader, &head.headers).await {
            Ok(body) => body,
            Err(err) => {
                debug!(error = %err, "failed to read HTTPS request body");
                return;
            }
        };

        let mut proxy_req = ProxyRequest::new(head.method.clone(), head.path.clone());
        proxy_req.headers = head.headers.clone();
        proxy_req.body = body;

        let directive = policy.route_request(&mut proxy_req, &sni_host);
        let (target_host, target_port, target_tls, effective_host, routed) = match &directive {
            Some(route) => (route.host.clone(), route.port, route.use_tls, route.host.clone(), true),
            None => (sni_host.clone(), 443, true, sni_host.clone(), false),
        };

        let url = format!("https://{sni_host}{}", head.path);

        if policy.on_request(&mut proxy_req, &effective_host).is_err() {
            emit_network_event(&events, &head.method, &url, &effective_host, None, 0, 0, 0, true, Some("secret leak".into()));
            write_blocked(reader.get_mut(), "secret placeholder sent to unauthorized host").await;
            return;
        }

        let started = Instant::now();
        match forward_request(&pool, &target_host, target_port, target_tls, &proxy_req.method, &proxy_req.path, &proxy_req.headers, &proxy_req.body).await {
            Ok(mut result) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                emit_network_event(
                    &events,
                    &head.method,
                    &url,
                    &sni_host,
                    Some(result.head.status),
                    result.request_bytes,
                    result.response_bytes,
                    duration_ms,
                    false,
                    None,
                );

                if routed {
                    result.head.headers.push((ROUTED_VIA_HEADER.0.to_string(), ROUTED_VIA_HEADER.1.to_string()));
                }

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
                warn!(host = target_host, error = %err, "HTTPS upstream forward failed");
                write_bad_gateway(reader.get_mut()).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use matchlock_ca::CaPool;
    use matchlock_events::EventBus;
    use matchlock_policy::{ModelMapping, PolicyEngine, RouteEntry, SystemResolver};
    use rustls_pki_types::pem::PemObject;
    use rustls_pki_types::ServerName;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    use super::*;

    async fn spawn_fake_backend() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0_u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            let body = b"{\"ok\":true}";
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.write_all(body).await.unwrap();
        });
        port
    }

    /// Drives a full MITM handshake through a routed request: a client
    /// presenting SNI `openrouter.ai` gets terminated with a CA-issued
    /// leaf, and the routing table redirects the matching chat-completion
    /// request to a local plaintext backend.
    #[tokio::test]
    async fn routed_request_reaches_local_backend_and_tags_response() {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let backend_port = spawn_fake_backend().await;

        let ca = Arc::new(CaPool::generate().unwrap());
        let ca_pem = ca.ca_certificate_pem().to_string();

        let mut model_map = HashMap::new();
        model_map.insert(
            "gpt-test".to_string(),
            ModelMapping {
                target_name: "local-model".to_string(),
                override_host_port: None,
            },
        );
        let route = RouteEntry {
            source_host: "openrouter.ai".to_string(),
            path: "/v1/chat/completions".to_string(),
            backend_host: "127.0.0.1".to_string(),
            backend_port,
            backend_chat_path: "/v1/chat/completions".to_string(),
            model_map,
        };
        let policy = Arc::new(PolicyEngine::builder().route(route).build());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_port = listener.local_addr().unwrap().port();
        let acceptor = TlsAcceptor::from(crate::tls::server_config(Arc::clone(&ca)));
        let pool = ConnectionPool::new();
        let (events, _rx) = EventBus::new();
        let resolver = Arc::new(SystemResolver);

        tokio::spawn(serve_https(listener, acceptor, policy, pool, events, resolver));

        let mut roots = rustls::RootCertStore::empty();
        let ca_der = rustls_pki_types::CertificateDer::from_pem_slice(ca_pem.as_bytes()).unwrap();
        roots.add(ca_der).unwrap();
        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client_config));

        let tcp = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
        let server_name = ServerName::try_from("openrouter.ai").unwrap();
        let mut tls_stream = connector.connect(server_name, tcp).await.unwrap();

        let body = br#"{"model":"gpt-test","messages":[]}"#;
        let request = format!(
            "POST /v1/chat/completions HTTP/1.1\r\nHost: openrouter.ai\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        tls_stream.write_all(request.as_bytes()).await.unwrap();
        tls_stream.write_all(body).await.unwrap();
        tls_stream.shutdown().await.unwrap();

        let mut response = Vec::new();
        tls_stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("X-Routed-Via: local-backend"));
        assert!(response.ends_with("{\"ok\":true}"));
    }
}
