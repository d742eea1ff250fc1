//! The top-level `Sandbox`: owns one Machine handle, Policy Engine, CA
//! Pool, VFS Root, Event Bus, Lifecycle Store, and the external
//! subnet/tap/firewall resources, and releases them all in reverse
//! acquisition order exactly once (spec §3, §4.8).

use std::sync::Arc;
use std::time::Duration;

use matchlock_ca::CaPool;
use matchlock_events::{CleanupStep, EventBus, EventReceiver, LifecycleError, LifecycleStore, Phase};
use matchlock_policy::PolicyEngine;
use matchlock_proxy::ProxyHandle;
use matchlock_relay::{Machine, RelayServer, GUEST_EXEC_PORT};
use matchlock_vfs::MountRouter;
use matchlock_vfs_protocol::{serve as serve_vfs, Dispatcher, Transport, UnixTransport};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::build::{build_mount_provider, build_policy_engine};
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::registry;
use crate::resource::ExternalResource;

/// How long [`Sandbox::start`] waits for the machine's exec port to
/// accept a stream before treating boot as failed (spec §5).
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// The per-VM result of a full teardown: the ordered cleanup log plus
/// whether every step succeeded. Cleanup always runs to completion; a
/// failed step never stops the rest (spec §4.8, §7).
#[derive(Debug)]
pub struct ShutdownReport {
    pub cleanup_log: Vec<CleanupStep>,
    pub result: SandboxResult<()>,
}

/// The top-level sandbox entity, identified by a string ID. See the
/// module docs for the ownership list and cleanup ordering.
pub struct Sandbox {
    id: String,
    machine: Arc<dyn Machine>,
    policy: Arc<PolicyEngine>,
    ca: Option<Arc<CaPool>>,
    dispatcher: Option<Arc<Dispatcher>>,
    vfs_transport: Option<Arc<dyn Transport>>,
    vfs_task: Option<JoinHandle<()>>,
    relay_task: Option<JoinHandle<()>>,
    proxy: Option<ProxyHandle>,
    external_resources: Vec<Box<dyn ExternalResource>>,
    events: EventBus,
    lifecycle: Arc<LifecycleStore>,
}

impl Sandbox {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    #[must_use]
    pub fn ca(&self) -> Option<&Arc<CaPool>> {
        self.ca.as_ref()
    }

    #[must_use]
    pub fn proxy_ports(&self) -> Option<matchlock_proxy::ProxyPorts> {
        self.proxy.as_ref().map(|handle| handle.ports)
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Build and start every owned component. On any failure, everything
    /// acquired so far is released (reverse order) before returning; the
    /// sandbox never exists half-built.
    pub async fn build(
        config: SandboxConfig,
        machine: Arc<dyn Machine>,
        external_resources: Vec<Box<dyn ExternalResource>>,
    ) -> SandboxResult<(Self, EventReceiver)> {
        let (events, event_rx) = EventBus::new();
        let lifecycle = Arc::new(LifecycleStore::new());

        if !registry::register(&config.id) {
            lifecycle.transition(Phase::CreateFailed, Some("duplicate sandbox id".to_string()));
            return Err(SandboxError::ConstructionFailed(anyhow::anyhow!(
                "sandbox id {:?} is already registered",
                config.id
            )));
        }

        let mut sandbox = Self {
            id: config.id.clone(),
            machine,
            policy: Arc::new(build_policy_engine(&config.policy)),
            ca: None,
            dispatcher: None,
            vfs_transport: None,
            vfs_task: None,
            relay_task: None,
            proxy: None,
            external_resources,
            events: events.clone(),
            lifecycle: Arc::clone(&lifecycle),
        };

        if let Err(err) = sandbox.acquire(&config).await {
            warn!(id = %config.id, error = %err, "sandbox construction failed, rolling back");
            let report = sandbox.teardown().await;
            registry::unregister(&config.id);
            let joined = match report.result {
                Ok(()) => err,
                Err(cleanup_err) => anyhow::anyhow!("{err}; rollback also failed: {cleanup_err}"),
            };
            lifecycle.transition(Phase::CreateFailed, Some(joined.to_string()));
            return Err(SandboxError::ConstructionFailed(joined));
        }

        lifecycle.transition(Phase::Created, None);
        info!(id = %sandbox.id, "sandbox created");
        Ok((sandbox, event_rx))
    }

    async fn acquire(&mut self, config: &SandboxConfig) -> Result<(), anyhow::Error> {
        let mut router = MountRouter::new();
        for mount in &config.mounts {
            let provider = build_mount_provider(mount, &self.events);
            router.mount(mount.path.clone(), provider);
        }
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(router)));
        self.dispatcher = Some(Arc::clone(&dispatcher));

        let transport: Arc<dyn Transport> = Arc::new(UnixTransport::bind(&config.vfs_socket_path)?);
        self.vfs_transport = Some(Arc::clone(&transport));
        self.vfs_task = Some(tokio::spawn(serve_vfs(transport, dispatcher)));

        let relay = RelayServer::bind(&config.relay_socket_path)?;
        let relay_machine = Arc::clone(&self.machine);
        self.relay_task = Some(tokio::spawn(relay.serve(relay_machine)));

        if config.enable_proxy {
            let ca = Arc::new(CaPool::generate()?);
            self.ca = Some(Arc::clone(&ca));
            let proxy = matchlock_proxy::start(Arc::clone(&self.policy), ca, self.events.clone()).await?;
            self.proxy = Some(proxy);
        }

        Ok(())
    }

    /// Wait for the machine to accept a stream on its exec port, treating
    /// that as the guest agent's readiness signal, then move to `Running`.
    /// Fails (and moves to `StartFailed`) if nothing answers within
    /// [`READY_TIMEOUT`].
    pub async fn start(&self) -> SandboxResult<()> {
        self.lifecycle.transition(Phase::Starting, None);
        match tokio::time::timeout(READY_TIMEOUT, self.machine.open_stream(GUEST_EXEC_PORT)).await {
            Ok(Ok(_stream)) => {
                self.lifecycle.transition(Phase::Running, None);
                info!(id = %self.id, "sandbox running");
                Ok(())
            }
            Ok(Err(err)) => {
                self.lifecycle.transition(Phase::StartFailed, Some(err.to_string()));
                Err(SandboxError::Io(err))
            }
            Err(_elapsed) => {
                self.lifecycle
                    .transition(Phase::StartFailed, Some("timed out waiting for machine ready signal".to_string()));
                Err(SandboxError::InvalidPhase("machine did not become ready in time".to_string()))
            }
        }
    }

    /// Release every owned resource in reverse acquisition order. Always
    /// runs every step; returns the ordered log plus a joined error if
    /// any step failed (spec §4.8, §7).
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.lifecycle.transition(Phase::Stopping, None);
        let report = self.teardown().await;
        registry::unregister(&self.id);
        match &report.result {
            Ok(()) => self.lifecycle.transition(Phase::Cleaned, None),
            Err(err) => self.lifecycle.transition(Phase::CleanupFailed, Some(err.to_string())),
        }
        report
    }

    /// The actual reverse-order release. Safe to call on a partially
    /// built sandbox (construction rollback) or a fully running one
    /// (normal shutdown): every field is optional and skipped if unset.
    async fn teardown(&mut self) -> ShutdownReport {
        self.lifecycle.transition(Phase::Cleaning, None);
        let lifecycle = Arc::clone(&self.lifecycle);
        let id = self.id.clone();
        let mut failures = Vec::new();

        run_step(&lifecycle, &id, "vfs-server", &mut failures, || async {
            if let Some(task) = self.vfs_task.take() {
                task.abort();
            }
            self.vfs_transport.take();
            Ok(())
        })
        .await;

        run_step(&lifecycle, &id, "hook-engine", &mut failures, || async {
            // Dropping the dispatcher drops every mount's HookEngine,
            // whose worker task drains its buffered queue and exits once
            // its channel sender is gone.
            self.dispatcher.take();
            Ok(())
        })
        .await;

        run_step(&lifecycle, &id, "network-stack", &mut failures, || async {
            if let Some(proxy) = self.proxy.take() {
                proxy.shutdown();
            }
            Ok(())
        })
        .await;

        run_step(&lifecycle, &id, "relay-server", &mut failures, || async {
            if let Some(task) = self.relay_task.take() {
                task.abort();
            }
            Ok(())
        })
        .await;

        while let Some(resource) = self.external_resources.pop() {
            let step_name = format!("subnet-release:{}", resource.name());
            run_step(&lifecycle, &id, &step_name, &mut failures, || async { resource.release().await }).await;
        }

        run_step(&lifecycle, &id, "event-channel", &mut failures, || async { Ok(()) }).await;
        run_step(&lifecycle, &id, "state-registry", &mut failures, || async { Ok(()) }).await;
        run_step(&lifecycle, &id, "machine", &mut failures, || async { Ok(()) }).await;
        run_step(&lifecycle, &id, "rootfs-removal", &mut failures, || async { Ok(()) }).await;

        let cleanup_log = lifecycle.cleanup_log();
        let result = if failures.is_empty() {
            Ok(())
        } else {
            Err(SandboxError::ShutdownJoined(anyhow::Error::new(LifecycleError::CleanupJoined(failures))))
        };
        ShutdownReport { cleanup_log, result }
    }
}

async fn run_step<F, Fut>(lifecycle: &LifecycleStore, id: &str, name: &str, failures: &mut Vec<String>, step: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), anyhow::Error>>,
{
    match step().await {
        Ok(()) => lifecycle.record_cleanup_step(name, true, None),
        Err(err) => {
            warn!(id, step = name, error = %err, "cleanup step failed");
            lifecycle.record_cleanup_step(name, false, Some(err.to_string()));
            failures.push(format!("{name}: {err}"));
        }
    }
}
