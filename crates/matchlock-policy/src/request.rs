//! The request shape the policy engine reads and rewrites in place.
//!
//! This is a thin, transport-agnostic view over an HTTP request: the proxy
//! (or a test) builds one from whatever it parsed off the wire, hands it
//! to [`crate::PolicyEngine`], then writes the (possibly rewritten) fields
//! back out.

/// A single in-flight HTTP request, as seen by the policy engine.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: String,
    /// Request path plus raw query string, e.g. `/v1/chat?key=SANDBOX_...`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.into()));
    }
}

/// The result of a routing decision: where to actually send the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDirective {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}
