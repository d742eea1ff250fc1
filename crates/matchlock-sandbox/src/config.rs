//! Plain, `serde`-serializable settings the caller builds in-process.
//!
//! Nothing in this module reads a file or environment variable — that
//! belongs to the (external) config-file loader. `SandboxConfig` is the
//! boundary a future loader, or a test, hands a ready-made value across.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One registered secret, as the caller supplies it. `placeholder: None`
/// asks the policy engine to generate one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// One local-model routing table row (spec scenario F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub source_host: String,
    pub path: String,
    pub backend_host: String,
    pub backend_port: u16,
    pub backend_chat_path: String,
    /// Guest-visible model name -> backend model name.
    pub model_map: HashMap<String, String>,
}

/// Host allowlist, secret table, and routing table in their
/// declarative, config-file-friendly shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub block_private_ips: bool,
    #[serde(default)]
    pub allowed_private_hosts: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// The closed set of provider kinds a mount can be built from, in their
/// declarative shape (see spec §9: tagged variants for the closed set,
/// trait objects only at the seam the assembled tree exposes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Memory,
    HostBacked { root: PathBuf },
    Readonly { inner: Box<ProviderConfig> },
    Overlay { lower: Box<ProviderConfig>, upper: Box<ProviderConfig> },
}

/// A config-driven hook rule. Rules with a dynamic action or a write
/// callback are a programmatic-only extension of [`matchlock_hooks::HookRule`]
/// and can't be expressed here; this covers the statically describable
/// subset (allow/block/mutate-with-fixed-bytes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRuleConfig {
    pub name: String,
    pub phase: HookPhaseConfig,
    #[serde(default)]
    pub ops: Vec<String>,
    #[serde(default)]
    pub path_glob: Option<String>,
    pub action: HookActionConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhaseConfig {
    Before,
    After,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookActionConfig {
    Allow,
    Block { reason: String },
    MutateWrite { bytes: Vec<u8> },
}

/// One mount point: where it attaches, what provider backs it, and the
/// hook rules (if any) wrapping it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub hooks: Vec<HookRuleConfig>,
    #[serde(default)]
    pub hook_queue_capacity: Option<usize>,
}

/// Everything needed to build one [`crate::Sandbox`]. Every field has a
/// sensible default so a test can construct one with only the fields it
/// cares about via `..Default::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub id: String,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    pub vfs_socket_path: PathBuf,
    pub relay_socket_path: PathBuf,
    /// Stands up the HTTP/HTTPS accept loops and generates the CA pool
    /// they need; `false` builds a VFS/relay-only sandbox (used by tests
    /// that don't need the network leg).
    #[serde(default = "default_true")]
    pub enable_proxy: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            policy: PolicyConfig::default(),
            mounts: Vec::new(),
            vfs_socket_path: PathBuf::from("/tmp/matchlock-vfs.sock"),
            relay_socket_path: PathBuf::from("/tmp/matchlock-relay.sock"),
            enable_proxy: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_config_round_trips_through_json() {
        let config = SandboxConfig {
            id: "demo".to_string(),
            policy: PolicyConfig {
                allowed_hosts: vec!["api.openai.com".to_string()],
                secrets: vec![SecretConfig {
                    name: "API_KEY".to_string(),
                    value: "sk-real".to_string(),
                    placeholder: None,
                    hosts: vec!["api.openai.com".to_string()],
                }],
                ..PolicyConfig::default()
            },
            mounts: vec![MountConfig {
                path: "/".to_string(),
                provider: ProviderConfig::Overlay {
                    lower: Box::new(ProviderConfig::Readonly { inner: Box::new(ProviderConfig::Memory) }),
                    upper: Box::new(ProviderConfig::Memory),
                },
                hooks: vec![HookRuleConfig {
                    name: "deny-secrets".to_string(),
                    phase: HookPhaseConfig::Before,
                    ops: vec!["create".to_string()],
                    path_glob: Some("/secrets/*".to_string()),
                    action: HookActionConfig::Block { reason: "read-only region".to_string() },
                }],
                hook_queue_capacity: None,
            }],
            ..SandboxConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let round_tripped: SandboxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.id, "demo");
        assert_eq!(round_tripped.mounts.len(), 1);
    }
}
