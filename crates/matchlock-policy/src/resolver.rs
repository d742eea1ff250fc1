//! DNS resolution is pluggable so `is_host_allowed` stays decidable in
//! tests without touching the network.

use std::net::IpAddr;

use async_trait::async_trait;

/// Resolves a hostname to the addresses it would actually connect to.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// Resolves via the system resolver through tokio's `lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        // lookup_host requires a socket-address-shaped string; port 0 is
        // never actually dialed here, only used to satisfy the parser.
        match tokio::net::lookup_host((host, 0_u16)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// A resolver with a fixed table, for tests that exercise
/// `is_host_allowed` against a non-literal hostname.
#[derive(Debug, Default, Clone)]
pub struct FixedResolver {
    table: std::collections::HashMap<String, Vec<IpAddr>>,
}

impl FixedResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.table.insert(host.into(), addrs);
        self
    }
}

#[async_trait]
impl HostResolver for FixedResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        self.table.get(host).cloned().unwrap_or_default()
    }
}
