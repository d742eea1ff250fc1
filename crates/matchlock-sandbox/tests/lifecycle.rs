//! End-to-end sandbox construction/shutdown through the public API,
//! covering the VFS-only path (no real network needed) plus the
//! construction-rollback and duplicate-ID guards.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use matchlock_relay::{GuestStream, Machine};
use matchlock_sandbox::{
    ExternalResource, HookActionConfig, HookPhaseConfig, HookRuleConfig, MountConfig, PolicyConfig, ProviderConfig,
    RouteConfig, Sandbox, SandboxConfig, SecretConfig,
};

/// A machine whose exec port always accepts, backed by a fresh duplex
/// pair per call; nothing in these tests talks to the guest side of it.
struct AlwaysReadyMachine;

#[async_trait]
impl Machine for AlwaysReadyMachine {
    async fn open_stream(&self, _port: u32) -> std::io::Result<Box<dyn GuestStream>> {
        let (ours, _theirs) = tokio::io::duplex(64);
        Ok(Box::new(ours))
    }

    fn supports_interactive(&self) -> bool {
        false
    }
}

fn socket_paths(tmp: &tempfile::TempDir, label: &str) -> (PathBuf, PathBuf) {
    (tmp.path().join(format!("{label}-vfs.sock")), tmp.path().join(format!("{label}-relay.sock")))
}

fn vfs_only_config(id: &str, vfs_socket_path: PathBuf, relay_socket_path: PathBuf) -> SandboxConfig {
    SandboxConfig {
        id: id.to_string(),
        vfs_socket_path,
        relay_socket_path,
        enable_proxy: false,
        ..SandboxConfig::default()
    }
}

#[tokio::test]
async fn build_start_shutdown_round_trips_through_every_phase() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "round-trip");
    let config = vfs_only_config("round-trip", vfs_socket_path, relay_socket_path);

    let (sandbox, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();
    assert_eq!(sandbox.phase(), matchlock_events::Phase::Created);

    sandbox.start().await.unwrap();
    assert_eq!(sandbox.phase(), matchlock_events::Phase::Running);

    let report = sandbox.shutdown().await;
    assert!(report.result.is_ok(), "unexpected cleanup failures: {:?}", report.result);
    let step_names: Vec<&str> = report.cleanup_log.iter().map(|step| step.name.as_str()).collect();
    assert_eq!(
        step_names,
        vec![
            "vfs-server",
            "hook-engine",
            "network-stack",
            "relay-server",
            "event-channel",
            "state-registry",
            "machine",
            "rootfs-removal",
        ]
    );
    assert!(report.cleanup_log.iter().all(|step| step.ok));
}

#[tokio::test]
async fn duplicate_sandbox_id_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "dup-one");
    let config = vfs_only_config("dup-id", vfs_socket_path, relay_socket_path);
    let (first, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();

    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "dup-two");
    let second_config = vfs_only_config("dup-id", vfs_socket_path, relay_socket_path);
    let second = Sandbox::build(second_config, Arc::new(AlwaysReadyMachine), Vec::new()).await;
    assert!(second.is_err());

    first.shutdown().await;
}

#[tokio::test]
async fn construction_rollback_releases_every_resource_already_acquired() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, _unused_relay_path) = socket_paths(&tmp, "rollback");
    // A relay socket path inside a directory that doesn't exist makes
    // `RelayServer::bind` fail after the VFS transport has already bound,
    // forcing the rollback path to release what `acquire` got to.
    let relay_socket_path = tmp.path().join("missing-subdir").join("relay.sock");
    let config = vfs_only_config("rollback", vfs_socket_path, relay_socket_path);

    let err = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await;
    assert!(err.is_err());

    // Rollback must have unregistered the id; a fresh attempt with the
    // same id and a valid relay path succeeds.
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "rollback-retry");
    let retry_config = vfs_only_config("rollback", vfs_socket_path, relay_socket_path);
    let (sandbox, _events) = Sandbox::build(retry_config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();
    sandbox.shutdown().await;
}

struct RecordingResource {
    name: String,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl ExternalResource for RecordingResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn external_resources_are_released_during_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "ext-res");
    let config = vfs_only_config("ext-res", vfs_socket_path, relay_socket_path);

    let released = Arc::new(AtomicBool::new(false));
    let resource = Box::new(RecordingResource { name: "tap-device".to_string(), released: Arc::clone(&released) });

    let (sandbox, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), vec![resource]).await.unwrap();
    let report = sandbox.shutdown().await;
    assert!(report.result.is_ok());
    assert!(released.load(Ordering::SeqCst));
    assert!(report.cleanup_log.iter().any(|step| step.name == "subnet-release:tap-device"));
}

#[tokio::test]
async fn secret_placeholder_resolves_only_for_its_allowed_host() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "secret");
    let mut config = vfs_only_config("secret", vfs_socket_path, relay_socket_path);
    config.policy = PolicyConfig {
        allowed_hosts: vec!["api.openai.com".to_string()],
        secrets: vec![SecretConfig {
            name: "OPENAI_API_KEY".to_string(),
            value: "sk-live-secret".to_string(),
            placeholder: Some("SANDBOX_SECRET_openai".to_string()),
            hosts: vec!["api.openai.com".to_string()],
        }],
        ..PolicyConfig::default()
    };

    let (sandbox, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();
    assert_eq!(
        sandbox.policy().secrets().value_for_placeholder("SANDBOX_SECRET_openai"),
        Some("sk-live-secret")
    );
    sandbox.shutdown().await;
}

#[tokio::test]
async fn sandbox_builds_and_tears_down_with_a_hook_wrapped_mount() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "hooked-mount");
    let mut config = vfs_only_config("hooked-mount", vfs_socket_path, relay_socket_path);
    config.mounts = vec![MountConfig {
        path: "/".to_string(),
        provider: ProviderConfig::Memory,
        hooks: vec![HookRuleConfig {
            name: "deny-secrets-dir".to_string(),
            phase: HookPhaseConfig::Before,
            ops: vec!["create".to_string()],
            path_glob: Some("/secrets/*".to_string()),
            action: HookActionConfig::Block { reason: "read-only region".to_string() },
        }],
        hook_queue_capacity: None,
    }];

    let (sandbox, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();
    sandbox.shutdown().await;
}

#[tokio::test]
async fn routing_table_round_trips_through_policy_engine() {
    let tmp = tempfile::tempdir().unwrap();
    let (vfs_socket_path, relay_socket_path) = socket_paths(&tmp, "routes");
    let mut config = vfs_only_config("routes", vfs_socket_path, relay_socket_path);
    config.policy.routes = vec![RouteConfig {
        source_host: "api.openai.com".to_string(),
        path: "/v1/chat/completions".to_string(),
        backend_host: "127.0.0.1".to_string(),
        backend_port: 11434,
        backend_chat_path: "/api/chat".to_string(),
        model_map: [("gpt-4o".to_string(), "llama3".to_string())].into_iter().collect(),
    }];

    let (sandbox, _events) = Sandbox::build(config, Arc::new(AlwaysReadyMachine), Vec::new()).await.unwrap();

    let mut req = matchlock_policy::ProxyRequest::new("POST", "/v1/chat/completions");
    req.body = br#"{"model":"gpt-4o"}"#.to_vec();
    let directive = sandbox.policy().route_request(&mut req, "api.openai.com");
    assert!(matches!(
        directive,
        Some(matchlock_policy::RouteDirective { ref host, port: 11434, .. }) if host == "127.0.0.1"
    ));

    sandbox.shutdown().await;
}
