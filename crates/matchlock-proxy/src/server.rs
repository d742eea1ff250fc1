//! Binds the HTTP, HTTPS, and optional passthrough listeners on
//! OS-chosen ephemeral ports and spawns their accept loops. External
//! nftables DNAT rules (out of scope here) point guest traffic at the
//! returned ports.

use std::sync::Arc;

use matchlock_ca::CaPool;
use matchlock_events::EventBus;
use matchlock_policy::{HostResolver, PolicyEngine, SystemResolver};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::error::ProxyError;
use crate::http_loop::serve_http;
use crate::https_loop::serve_https;
use crate::passthrough::serve_passthrough;
use crate::pool::ConnectionPool;
use crate::tls;

/// The ports the proxy ended up bound to, for the launcher to wire into
/// the guest's DNAT rules.
#[derive(Debug, Clone, Copy)]
pub struct ProxyPorts {
    pub http: u16,
    pub https: u16,
}

/// Owns the background tasks backing a running proxy instance. Dropping
/// this does not stop the tasks; call [`ProxyHandle::shutdown`].
pub struct ProxyHandle {
    pub ports: ProxyPorts,
    tasks: Vec<JoinHandle<()>>,
    reaper: JoinHandle<()>,
}

impl ProxyHandle {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        self.reaper.abort();
    }
}

/// Starts the HTTP and HTTPS accept loops bound to ephemeral ports on
/// loopback, plus the shared connection pool's reaper.
pub async fn start(policy: Arc<PolicyEngine>, ca: Arc<CaPool>, events: EventBus) -> Result<ProxyHandle, ProxyError> {
    start_with_resolver(policy, ca, events, Arc::new(SystemResolver)).await
}

pub async fn start_with_resolver(
    policy: Arc<PolicyEngine>,
    ca: Arc<CaPool>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) -> Result<ProxyHandle, ProxyError> {
    let http_listener = TcpListener::bind("127.0.0.1:0").await.map_err(ProxyError::UpstreamConnect)?;
    let https_listener = TcpListener::bind("127.0.0.1:0").await.map_err(ProxyError::UpstreamConnect)?;

    let ports = ProxyPorts {
        http: http_listener.local_addr().map_err(ProxyError::UpstreamConnect)?.port(),
        https: https_listener.local_addr().map_err(ProxyError::UpstreamConnect)?.port(),
    };

    let pool = ConnectionPool::new();
    let reaper = pool.spawn_reaper();

    let acceptor = TlsAcceptor::from(tls::server_config(ca));

    let http_task = tokio::spawn(serve_http(http_listener, Arc::clone(&policy), Arc::clone(&pool), events.clone(), Arc::clone(&resolver)));
    let https_task = tokio::spawn(serve_https(https_listener, acceptor, policy, pool, events, resolver));

    Ok(ProxyHandle {
        ports,
        tasks: vec![http_task, https_task],
        reaper,
    })
}

/// Starts a passthrough loop bound to an ephemeral port, forwarding
/// every accepted connection to one fixed destination after a single
/// allowlist check.
pub async fn start_passthrough(
    destination_host: String,
    destination_port: u16,
    policy: Arc<PolicyEngine>,
    events: EventBus,
    resolver: Arc<dyn HostResolver>,
) -> Result<(u16, JoinHandle<()>), ProxyError> {
    let listener = TcpListener::bind("127.0.0.1:0").await.map_err(ProxyError::UpstreamConnect)?;
    let port = listener.local_addr().map_err(ProxyError::UpstreamConnect)?.port();
    let task = tokio::spawn(serve_passthrough(listener, destination_host, destination_port, policy, events, resolver));
    Ok((port, task))
}

#[cfg(test)]
mod tests {
    use matchlock_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn start_binds_two_distinct_ephemeral_ports_and_shuts_down_cleanly() {
        let policy = Arc::new(PolicyEngine::builder().build());
        let ca = Arc::new(CaPool::generate().unwrap());
        let (events, _rx) = EventBus::new();

        let handle = start(policy, ca, events).await.unwrap();
        assert_ne!(handle.ports.http, 0);
        assert_ne!(handle.ports.https, 0);
        assert_ne!(handle.ports.http, handle.ports.https);

        handle.shutdown();
    }
}
