//! Per-VM lifecycle phase tracking and the ordered cleanup log.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The monotonic set of phases a sandbox moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Resource acquisition is in progress.
    Creating,
    /// All resources acquired successfully.
    Created,
    /// Resource acquisition failed; partial resources were released.
    CreateFailed,
    /// The machine is booting.
    Starting,
    /// The machine is up and serving guest traffic.
    Running,
    /// Boot failed.
    StartFailed,
    /// Shutdown has been requested.
    Stopping,
    /// The machine has stopped.
    Stopped,
    /// Shutdown failed.
    StopFailed,
    /// Resource teardown is in progress.
    Cleaning,
    /// Resource teardown completed.
    Cleaned,
    /// Resource teardown failed partway through.
    CleanupFailed,
}

impl Phase {
    /// `true` for phases representing a terminal failure of their stage.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::CreateFailed | Self::StartFailed | Self::StopFailed | Self::CleanupFailed
        )
    }
}

/// One recorded step of the sandbox's reverse-order cleanup sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupStep {
    /// Name of the resource released (e.g. `"vfs-server"`, `"network-stack"`).
    pub name: String,
    /// When the step completed (successfully or not).
    pub completed_at: DateTime<Utc>,
    /// `true` if the step released its resource without error.
    pub ok: bool,
    /// Error detail, if `ok` is false.
    pub error: Option<String>,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    last_error: Option<String>,
    cleanup_log: Vec<CleanupStep>,
}

/// Append-updated lifecycle state for a single sandbox.
///
/// Failed transitions record `last_error` and move to the matching
/// `*Failed` phase but never block subsequent cleanup steps from running.
#[derive(Debug)]
pub struct LifecycleStore {
    inner: Mutex<Inner>,
}

impl LifecycleStore {
    /// Create a store starting in [`Phase::Creating`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Creating,
                last_error: None,
                cleanup_log: Vec::new(),
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Move to a new phase, recording an error if the phase is a failure
    /// variant. Never panics and never refuses the transition: a refusal
    /// to transition is a [`crate::LifecycleError::Invariant`] at the call
    /// site, not something this store enforces.
    pub fn transition(&self, phase: Phase, error: Option<String>) {
        let mut inner = self.lock();
        inner.phase = phase;
        if phase.is_failure() {
            inner.last_error = error;
        }
    }

    /// The last recorded error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Append one cleanup step to the ordered log. Cleanup always
    /// continues regardless of whether `ok` is true.
    pub fn record_cleanup_step(&self, name: impl Into<String>, ok: bool, error: Option<String>) {
        self.lock().cleanup_log.push(CleanupStep {
            name: name.into(),
            completed_at: Utc::now(),
            ok,
            error,
        });
    }

    /// A snapshot of the cleanup log so far, in the order steps ran.
    #[must_use]
    pub fn cleanup_log(&self) -> Vec<CleanupStep> {
        self.lock().cleanup_log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for LifecycleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_and_records_errors() {
        let store = LifecycleStore::new();
        assert_eq!(store.phase(), Phase::Creating);

        store.transition(Phase::Created, None);
        assert_eq!(store.phase(), Phase::Created);
        assert!(store.last_error().is_none());

        store.transition(Phase::StopFailed, Some("upstream hung".into()));
        assert_eq!(store.phase(), Phase::StopFailed);
        assert_eq!(store.last_error().as_deref(), Some("upstream hung"));
    }

    #[test]
    fn cleanup_log_preserves_order_and_continues_past_failures() {
        let store = LifecycleStore::new();
        store.record_cleanup_step("vfs-server", true, None);
        store.record_cleanup_step("network-stack", false, Some("device busy".into()));
        store.record_cleanup_step("event-channel", true, None);

        let log = store.cleanup_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].name, "vfs-server");
        assert!(log[0].ok);
        assert_eq!(log[1].name, "network-stack");
        assert!(!log[1].ok);
        assert_eq!(log[2].name, "event-channel");
        assert!(log[2].ok);
    }
}
