//! Per-host idle upstream connection pool. Mirrors the bounded,
//! reaper-swept pool shape used elsewhere in this workspace for
//! short-lived resource caches, sized for a handful of hot upstreams
//! rather than a general-purpose client pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::conn::UpstreamConn;

pub const MAX_IDLE_PER_HOST: usize = 4;
pub const IDLE_TTL: Duration = Duration::from_secs(90);
pub const REAP_INTERVAL: Duration = Duration::from_secs(30);

struct IdleConn {
    stream: Box<dyn UpstreamConn>,
    parked_at: Instant,
}

/// Idle upstream connections keyed by `host:port:tls`.
#[derive(Default)]
pub struct ConnectionPool {
    by_host: Mutex<HashMap<String, Vec<IdleConn>>>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take an idle connection for `key`, if one hasn't expired.
    pub async fn take(&self, key: &str) -> Option<Box<dyn UpstreamConn>> {
        let mut by_host = self.by_host.lock().await;
        let conns = by_host.get_mut(key)?;
        while let Some(conn) = conns.pop() {
            if conn.parked_at.elapsed() < IDLE_TTL {
                return Some(conn.stream);
            }
        }
        None
    }

    /// Return a connection to the pool unless the host's bucket is full,
    /// in which case the connection is simply dropped (closed).
    pub async fn put(&self, key: &str, stream: Box<dyn UpstreamConn>) {
        let mut by_host = self.by_host.lock().await;
        let conns = by_host.entry(key.to_string()).or_default();
        if conns.len() >= MAX_IDLE_PER_HOST {
            return;
        }
        conns.push(IdleConn { stream, parked_at: Instant::now() });
    }

    /// Drop every connection older than [`IDLE_TTL`]. Intended to run on
    /// a [`REAP_INTERVAL`] timer.
    pub async fn reap_expired(&self) {
        let mut by_host = self.by_host.lock().await;
        let mut reaped = 0usize;
        for conns in by_host.values_mut() {
            let before = conns.len();
            conns.retain(|c| c.parked_at.elapsed() < IDLE_TTL);
            reaped += before - conns.len();
        }
        by_host.retain(|_, conns| !conns.is_empty());
        if reaped > 0 {
            debug!(reaped, "connection pool reaper swept expired upstreams");
        }
    }

    /// Spawns the periodic reaper task; the returned handle may be
    /// dropped to leave it running in the background.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                ticker.tick().await;
                pool.reap_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn put_then_take_returns_a_connection() {
        let pool = ConnectionPool::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let _server_side = listener.accept().await.unwrap();

        pool.put("example.com:443:false", Box::new(client)).await;
        assert!(pool.take("example.com:443:false").await.is_some());
        assert!(pool.take("example.com:443:false").await.is_none());
    }

    #[tokio::test]
    async fn bucket_caps_at_max_idle_per_host() {
        let pool = ConnectionPool::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        for _ in 0..MAX_IDLE_PER_HOST + 2 {
            let client = TcpStream::connect(addr).await.unwrap();
            let _server_side = listener.accept().await.unwrap();
            pool.put("h:1:false", Box::new(client)).await;
        }

        let by_host = pool.by_host.lock().await;
        assert_eq!(by_host.get("h:1:false").unwrap().len(), MAX_IDLE_PER_HOST);
    }
}
