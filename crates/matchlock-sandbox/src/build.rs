//! Translates the declarative [`crate::config`] structs into the live
//! policy engine and VFS provider tree a [`crate::Sandbox`] runs.

use std::sync::Arc;

use matchlock_events::{EventBus, FileEvent, MatchlockEvent};
use matchlock_hooks::{Action, EventSink, HookEngine, HookRule, InterceptVfs, Phase as HookPhase, VfsOp};
use matchlock_policy::{PolicyEngine, RouteEntry, SecretTable};
use matchlock_vfs::{HostVfs, MemoryVfs, OverlayVfs, ReadonlyVfs, VfsProvider};

use crate::config::{
    HookActionConfig, HookPhaseConfig, HookRuleConfig, MountConfig, PolicyConfig, ProviderConfig, RouteConfig,
};

pub(crate) fn build_policy_engine(config: &PolicyConfig) -> PolicyEngine {
    let mut secrets = SecretTable::new();
    for secret in &config.secrets {
        secrets.insert(
            secret.name.clone(),
            secret.value.clone(),
            secret.placeholder.clone(),
            secret.hosts.clone(),
        );
    }

    let mut builder = PolicyEngine::builder()
        .block_private_ips(config.block_private_ips)
        .secrets(secrets);
    for host in &config.allowed_hosts {
        builder = builder.allow_host(host.clone());
    }
    for host in &config.allowed_private_hosts {
        builder = builder.allow_private_host(host.clone());
    }
    for route in &config.routes {
        builder = builder.route(route_entry(route));
    }
    builder.build()
}

fn route_entry(route: &RouteConfig) -> RouteEntry {
    RouteEntry {
        source_host: route.source_host.clone(),
        path: route.path.clone(),
        backend_host: route.backend_host.clone(),
        backend_port: route.backend_port,
        backend_chat_path: route.backend_chat_path.clone(),
        model_map: route
            .model_map
            .iter()
            .map(|(guest_name, backend_name)| {
                (
                    guest_name.clone(),
                    matchlock_policy::ModelMapping {
                        target_name: backend_name.clone(),
                        override_host_port: None,
                    },
                )
            })
            .collect(),
    }
}

fn build_base_provider(config: &ProviderConfig) -> Box<dyn VfsProvider> {
    match config {
        ProviderConfig::Memory => Box::new(MemoryVfs::new()),
        ProviderConfig::HostBacked { root } => Box::new(HostVfs::new(root.clone())),
        ProviderConfig::Readonly { inner } => Box::new(ReadonlyVfs::new(build_base_provider(inner))),
        ProviderConfig::Overlay { lower, upper } => {
            Box::new(OverlayVfs::new(build_base_provider(lower), build_base_provider(upper)))
        }
    }
}

/// Build the provider tree for one mount, wrapping it in an
/// [`InterceptVfs`] when the mount declares hook rules. `events` is the
/// sink hook file events publish to; `name` labels the mount in errors.
pub(crate) fn build_mount_provider(mount: &MountConfig, events: &EventBus) -> Box<dyn VfsProvider> {
    let provider = build_base_provider(&mount.provider);
    if mount.hooks.is_empty() {
        return provider;
    }

    let rules: Vec<HookRule> = mount.hooks.iter().map(build_hook_rule).collect();
    let capacity = mount.hook_queue_capacity.unwrap_or(matchlock_hooks::MIN_QUEUE_CAPACITY);
    let events = events.clone();
    let sink: EventSink = Arc::new(move |request, ok| {
        events.publish(MatchlockEvent::file(FileEvent {
            op: request.op.to_string(),
            path: request.path.clone(),
            size: request.data_len(),
            mode: request.mode,
            uid: request.uid,
            gid: request.gid,
        }));
        let _ = ok;
    });

    let engine = HookEngine::new(rules, capacity).with_sink(sink);
    Box::new(InterceptVfs::new(provider, engine))
}

fn build_hook_rule(rule: &HookRuleConfig) -> HookRule {
    let phase = match rule.phase {
        HookPhaseConfig::Before => HookPhase::Before,
        HookPhaseConfig::After => HookPhase::After,
    };
    let action = match &rule.action {
        HookActionConfig::Allow => Action::Allow,
        HookActionConfig::Block { reason } => Action::block(reason.clone()),
        HookActionConfig::MutateWrite { bytes } => Action::mutate_static(bytes.clone()),
    };

    let mut built = HookRule::new(rule.name.clone(), phase, action);
    let ops: Vec<VfsOp> = rule.ops.iter().filter_map(|op| parse_vfs_op(op)).collect();
    if !ops.is_empty() {
        built = built.with_ops(ops);
    }
    if let Some(glob) = &rule.path_glob {
        built = built.with_path_glob(glob);
    }
    built
}

fn parse_vfs_op(name: &str) -> Option<VfsOp> {
    Some(match name {
        "stat" => VfsOp::Stat,
        "readdir" => VfsOp::Readdir,
        "mkdir" => VfsOp::Mkdir,
        "mkdir_all" => VfsOp::MkdirAll,
        "create" => VfsOp::Create,
        "open" => VfsOp::Open,
        "read" => VfsOp::Read,
        "write" => VfsOp::Write,
        "fsync" => VfsOp::Fsync,
        "release" => VfsOp::Release,
        "truncate" => VfsOp::Truncate,
        "setattr" => VfsOp::Setattr,
        "unlink" => VfsOp::Unlink,
        "rmdir" => VfsOp::Rmdir,
        "remove_all" => VfsOp::RemoveAll,
        "rename" => VfsOp::Rename,
        "symlink" => VfsOp::Symlink,
        "readlink" => VfsOp::Readlink,
        "link" => VfsOp::Link,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretConfig;

    #[test]
    fn policy_config_builds_working_secret_table() {
        let config = PolicyConfig {
            allowed_hosts: vec!["api.openai.com".into()],
            secrets: vec![SecretConfig {
                name: "API_KEY".into(),
                value: "sk-real".into(),
                placeholder: Some("SANDBOX_SECRET_fixed".into()),
                hosts: vec!["api.openai.com".into()],
            }],
            ..Default::default()
        };
        let engine = build_policy_engine(&config);
        assert_eq!(
            engine.secrets().value_for_placeholder("SANDBOX_SECRET_fixed"),
            Some("sk-real")
        );
    }

    #[tokio::test]
    async fn memory_mount_without_hooks_round_trips() {
        let (events, _rx) = EventBus::new();
        let mount = MountConfig {
            path: "/".into(),
            provider: ProviderConfig::Memory,
            hooks: Vec::new(),
            hook_queue_capacity: None,
        };
        let provider = build_mount_provider(&mount, &events);
        let (_, handle) = provider.create("/a.txt", 0o644).await.unwrap();
        provider.write(handle, 0, b"hello").await.unwrap();
        provider.release(handle).await.unwrap();

        let handle = provider.open("/a.txt", false, false).await.unwrap();
        let bytes = provider.read(handle, 0, 16).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn blocking_hook_rejects_matching_create_before_touching_provider() {
        let (events, _rx) = EventBus::new();
        let mount = MountConfig {
            path: "/".into(),
            provider: ProviderConfig::Memory,
            hooks: vec![HookRuleConfig {
                name: "block-secrets".into(),
                phase: HookPhaseConfig::Before,
                ops: vec!["create".into()],
                path_glob: Some("/secrets/*".into()),
                action: HookActionConfig::Block { reason: "read-only region".into() },
            }],
            hook_queue_capacity: None,
        };
        let provider = build_mount_provider(&mount, &events);

        let err = provider.create("/secrets/token", 0o600).await.unwrap_err();
        assert!(matches!(err, matchlock_vfs::VfsError::PermissionDenied(_)));
        assert!(provider.stat("/secrets/token").await.is_err());
    }

    #[tokio::test]
    async fn allowed_create_emits_a_file_event() {
        let (events, mut rx) = EventBus::new();
        let mount = MountConfig {
            path: "/".into(),
            provider: ProviderConfig::Memory,
            hooks: vec![HookRuleConfig {
                name: "log-creates".into(),
                phase: HookPhaseConfig::Before,
                ops: vec!["create".into()],
                path_glob: None,
                action: HookActionConfig::Allow,
            }],
            hook_queue_capacity: None,
        };
        let provider = build_mount_provider(&mount, &events);
        provider.create("/a.txt", 0o644).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "file");
    }
}
