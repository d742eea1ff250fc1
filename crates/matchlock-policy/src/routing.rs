//! Local-model routing table (spec scenario F): rewrite a chat-completion
//! request bound for a cloud host onto a local backend, translating the
//! model name on the way.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::request::{ProxyRequest, RouteDirective};

/// Headers stripped from a routed request: the guest's credentials for the
/// original cloud host must never reach the local backend.
const VENDOR_HEADER_PREFIXES: &[&str] = &["x-api-key", "anthropic-", "openai-", "x-goog-"];

/// One entry of a model→backend mapping.
#[derive(Debug, Clone)]
pub struct ModelMapping {
    pub target_name: String,
    pub override_host_port: Option<(String, u16)>,
}

/// One row of the routing table.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub source_host: String,
    pub path: String,
    pub backend_host: String,
    pub backend_port: u16,
    /// The path the backend expects chat-completion requests on, e.g.
    /// `/v1/chat/completions` for an Ollama-compatible backend.
    pub backend_chat_path: String,
    pub model_map: HashMap<String, ModelMapping>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    model: String,
}

/// Header added to the response so the guest can tell a request was
/// served by a local backend rather than the original cloud host.
pub const ROUTED_VIA_HEADER: (&str, &str) = ("X-Routed-Via", "local-backend");

/// Apply the routing table to `req`, mutating it in place when a route
/// matches. Returns the directive describing where to actually send the
/// (possibly rewritten) request, or `None` if no route applies.
#[must_use]
pub fn route_request(routes: &[RouteEntry], req: &mut ProxyRequest, host: &str) -> Option<RouteDirective> {
    let route = routes.iter().find(|r| r.source_host == host)?;

    if !req.method.eq_ignore_ascii_case("POST") || req.path != route.path {
        return None;
    }

    let parsed: ChatBody = serde_json::from_slice(&req.body).ok()?;
    let mapping = route.model_map.get(&parsed.model)?;

    let (target_host, target_port) = mapping
        .override_host_port
        .clone()
        .unwrap_or_else(|| (route.backend_host.clone(), route.backend_port));

    req.path = route.backend_chat_path.clone();
    req.remove_header("Authorization");
    req.headers
        .retain(|(name, _)| !is_vendor_header(name));
    req.set_header("Host", format!("{target_host}:{target_port}"));

    if let Ok(mut body) = serde_json::from_slice::<serde_json::Value>(&req.body) {
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "model".to_string(),
                serde_json::Value::String(mapping.target_name.clone()),
            );
        }
        if let Ok(rewritten) = serde_json::to_vec(&body) {
            req.body = rewritten;
        }
    }

    debug!(host, backend = target_host, model = parsed.model, "routed request to local backend");

    Some(RouteDirective {
        host: target_host,
        port: target_port,
        use_tls: false,
    })
}

fn is_vendor_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VENDOR_HEADER_PREFIXES.iter().any(|p| lower.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route() -> RouteEntry {
        let mut model_map = HashMap::new();
        model_map.insert(
            "meta-llama/x".to_string(),
            ModelMapping {
                target_name: "llama3.1:8b".to_string(),
                override_host_port: None,
            },
        );
        RouteEntry {
            source_host: "openrouter.ai".to_string(),
            path: "/api/v1/chat/completions".to_string(),
            backend_host: "127.0.0.1".to_string(),
            backend_port: 11434,
            backend_chat_path: "/v1/chat/completions".to_string(),
            model_map,
        }
    }

    #[test]
    fn routes_matching_model_and_rewrites_body() {
        let routes = vec![sample_route()];
        let mut req = ProxyRequest::new("POST", "/api/v1/chat/completions")
            .with_header("Authorization", "Bearer SANDBOX_SECRET_abc")
            .with_body(br#"{"model":"meta-llama/x","messages":[]}"#.to_vec());

        let directive = route_request(&routes, &mut req, "openrouter.ai").unwrap();

        assert_eq!(directive.host, "127.0.0.1");
        assert_eq!(directive.port, 11434);
        assert!(!directive.use_tls);
        assert_eq!(req.path, "/v1/chat/completions");
        assert!(req.header("Authorization").is_none());

        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["model"], "llama3.1:8b");
    }

    #[test]
    fn unmatched_host_returns_none() {
        let routes = vec![sample_route()];
        let mut req = ProxyRequest::new("POST", "/api/v1/chat/completions")
            .with_body(br#"{"model":"meta-llama/x"}"#.to_vec());
        assert!(route_request(&routes, &mut req, "api.openai.com").is_none());
    }

    #[test]
    fn unknown_model_returns_none_and_leaves_request_untouched() {
        let routes = vec![sample_route()];
        let mut req = ProxyRequest::new("POST", "/api/v1/chat/completions")
            .with_header("Authorization", "Bearer keep-me")
            .with_body(br#"{"model":"unknown/model"}"#.to_vec());
        assert!(route_request(&routes, &mut req, "openrouter.ai").is_none());
        assert_eq!(req.header("Authorization"), Some("Bearer keep-me"));
    }
}
