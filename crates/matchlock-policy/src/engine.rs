//! The policy engine: host allowlist, secret substitution, local-model
//! routing. Immutable in shape after construction; the secret table's
//! placeholders may still be filled lazily under its own lock.

use matchlock_core::{glob, host};
use tracing::warn;

use crate::error::PolicyError;
use crate::request::{ProxyRequest, RouteDirective};
use crate::resolver::HostResolver;
use crate::routing::{route_request, RouteEntry};
use crate::secret::SecretTable;

/// Host allowlist plus secret table plus routing table, built once per
/// sandbox and shared (read-mostly) across the proxy's connection tasks.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    allowed_hosts: Vec<String>,
    block_private_ips: bool,
    allowed_private_hosts: Vec<String>,
    secrets: SecretTable,
    routes: Vec<RouteEntry>,
}

impl PolicyEngine {
    #[must_use]
    pub fn builder() -> PolicyEngineBuilder {
        PolicyEngineBuilder::default()
    }

    /// Strip any `:port`, then decide: private-IP denial first, then an
    /// empty allowlist allows everything, then longest-glob match.
    pub async fn is_host_allowed(&self, raw_host: &str, resolver: &dyn HostResolver) -> bool {
        let host_part = host::strip_port(raw_host);

        if self.block_private_ips
            && self.resolves_to_private(host_part, resolver).await
            && !glob::matches_any(self.allowed_private_hosts.iter().map(String::as_str), host_part)
        {
            return false;
        }

        if self.allowed_hosts.is_empty() {
            return true;
        }

        glob::matches_any(self.allowed_hosts.iter().map(String::as_str), host_part)
    }

    async fn resolves_to_private(&self, host_part: &str, resolver: &dyn HostResolver) -> bool {
        if let Some(ip) = host::parse_ip_literal(host_part) {
            return host::is_private_address(ip);
        }
        resolver
            .resolve(host_part)
            .await
            .into_iter()
            .any(host::is_private_address)
    }

    /// Scan/rewrite `req` for secret placeholders bound for `effective_host`.
    ///
    /// For every secret whose host-glob list does not cover
    /// `effective_host`, the placeholder must not appear anywhere in the
    /// request's headers or URL; if it does, the request is rejected with
    /// [`PolicyError::SecretLeak`]. For secrets that do cover the host,
    /// every occurrence of the placeholder in header values is replaced
    /// with the real value. The body is never touched.
    pub fn on_request(&self, req: &mut ProxyRequest, effective_host: &str) -> Result<(), PolicyError> {
        for secret in self.secrets.iter() {
            let allowed = secret.allows_host(effective_host);
            let placeholder = secret.placeholder();

            if !allowed {
                if req.path.contains(placeholder)
                    || req.headers.iter().any(|(_, v)| v.contains(placeholder))
                {
                    warn!(host = effective_host, "secret placeholder sent to unauthorized host");
                    return Err(PolicyError::SecretLeak);
                }
                continue;
            }

            let Some(value) = self.secrets.value_for_placeholder(placeholder) else {
                continue;
            };
            req.path = req.path.replace(placeholder, value);
            for (_, v) in &mut req.headers {
                if v.contains(placeholder) {
                    *v = v.replace(placeholder, value);
                }
            }
        }
        Ok(())
    }

    /// Apply the local-model routing table, if any.
    #[must_use]
    pub fn route_request(&self, req: &mut ProxyRequest, host: &str) -> Option<RouteDirective> {
        if self.routes.is_empty() {
            return None;
        }
        route_request(&self.routes, req, host)
    }

    #[must_use]
    pub fn secrets(&self) -> &SecretTable {
        &self.secrets
    }

    #[must_use]
    pub fn secrets_mut(&mut self) -> &mut SecretTable {
        &mut self.secrets
    }
}

/// Builder for [`PolicyEngine`]; the engine's shape is fixed once built.
#[derive(Debug, Default)]
pub struct PolicyEngineBuilder {
    allowed_hosts: Vec<String>,
    block_private_ips: bool,
    allowed_private_hosts: Vec<String>,
    secrets: SecretTable,
    routes: Vec<RouteEntry>,
}

impl PolicyEngineBuilder {
    #[must_use]
    pub fn allow_host(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_hosts.push(pattern.into());
        self
    }

    #[must_use]
    pub fn block_private_ips(mut self, block: bool) -> Self {
        self.block_private_ips = block;
        self
    }

    #[must_use]
    pub fn allow_private_host(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_private_hosts.push(pattern.into());
        self
    }

    #[must_use]
    pub fn secrets(mut self, secrets: SecretTable) -> Self {
        self.secrets = secrets;
        self
    }

    #[must_use]
    pub fn route(mut self, route: RouteEntry) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn build(self) -> PolicyEngine {
        PolicyEngine {
            allowed_hosts: self.allowed_hosts,
            block_private_ips: self.block_private_ips,
            allowed_private_hosts: self.allowed_private_hosts,
            secrets: self.secrets,
            routes: self.routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{FixedResolver, SystemResolver};

    #[tokio::test]
    async fn empty_allowlist_allows_everything() {
        let engine = PolicyEngine::builder().build();
        assert!(engine.is_host_allowed("anything.example.com", &SystemResolver).await);
    }

    #[tokio::test]
    async fn allowlist_matches_longest_glob() {
        let engine = PolicyEngine::builder()
            .allow_host("*.example.com")
            .build();
        assert!(engine.is_host_allowed("api.example.com", &SystemResolver).await);
        assert!(!engine.is_host_allowed("evil.com", &SystemResolver).await);
    }

    #[tokio::test]
    async fn private_ip_literal_denied_without_io() {
        let engine = PolicyEngine::builder()
            .allow_host("*")
            .block_private_ips(true)
            .build();
        assert!(!engine.is_host_allowed("127.0.0.1", &SystemResolver).await);
        assert!(engine.is_host_allowed("8.8.8.8", &SystemResolver).await);
    }

    #[tokio::test]
    async fn private_ip_via_resolver_is_denied() {
        let resolver = FixedResolver::new().with("internal.svc", vec!["10.0.0.5".parse().unwrap()]);
        let engine = PolicyEngine::builder()
            .allow_host("*")
            .block_private_ips(true)
            .build();
        assert!(!engine.is_host_allowed("internal.svc", &resolver).await);
    }

    #[tokio::test]
    async fn allowed_private_host_overrides_block() {
        let engine = PolicyEngine::builder()
            .allow_host("*")
            .block_private_ips(true)
            .allow_private_host("localhost")
            .build();
        assert!(engine.is_host_allowed("localhost", &SystemResolver).await);
    }

    #[test]
    fn on_request_injects_secret_for_allowed_host() {
        let mut secrets = SecretTable::new();
        let placeholder = secrets.insert("API_KEY", "sk-real", None, vec!["api.openai.com".into()]);
        let engine = PolicyEngine::builder().secrets(secrets).build();

        let mut req = ProxyRequest::new("GET", "/v1/x")
            .with_header("Authorization", format!("Bearer {placeholder}"));

        engine.on_request(&mut req, "api.openai.com").unwrap();
        assert_eq!(req.header("Authorization"), Some("Bearer sk-real"));
    }

    #[test]
    fn on_request_rejects_leak_to_unauthorized_host() {
        let mut secrets = SecretTable::new();
        let placeholder = secrets.insert("API_KEY", "sk-real", None, vec!["api.openai.com".into()]);
        let engine = PolicyEngine::builder().secrets(secrets).build();

        let mut req = ProxyRequest::new("GET", "/").with_header("X-Leak", placeholder);
        let err = engine.on_request(&mut req, "evil.com").unwrap_err();
        assert!(matches!(err, PolicyError::SecretLeak));
    }

    #[test]
    fn on_request_never_touches_the_body() {
        let mut secrets = SecretTable::new();
        let placeholder = secrets.insert("API_KEY", "sk-real", None, vec!["api.openai.com".into()]);
        let engine = PolicyEngine::builder().secrets(secrets).build();

        let body = format!("echo {placeholder}").into_bytes();
        let mut req = ProxyRequest::new("POST", "/").with_body(body.clone());
        engine.on_request(&mut req, "api.openai.com").unwrap();
        assert_eq!(req.body, body);
    }
}
