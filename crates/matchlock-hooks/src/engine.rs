//! Runs before/after hooks around VFS calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use matchlock_vfs::VfsError;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::request::HookRequest;
use crate::rule::{Action, HookRule, Phase};

/// Lower bound on the async after-hook queue, matching the engine's
/// minimum stated capacity.
pub const MIN_QUEUE_CAPACITY: usize = 128;

/// Closure invoked after every intercepted call with the final request
/// and whether the inner provider call succeeded.
pub type EventSink = Arc<dyn Fn(&HookRequest, bool) + Send + Sync>;

struct AsyncJob {
    rule_name: String,
    request: HookRequest,
}

/// Owns a frozen rule set, a bounded worker queue for async after-hooks,
/// and the side-effect re-entrancy guard.
pub struct HookEngine {
    rules: Vec<HookRule>,
    queue: mpsc::Sender<AsyncJob>,
    side_effect_in_flight: Arc<AtomicBool>,
    sink: Option<EventSink>,
}

impl HookEngine {
    /// Build an engine from a frozen rule set. `queue_capacity` is
    /// clamped up to [`MIN_QUEUE_CAPACITY`].
    #[must_use]
    pub fn new(rules: Vec<HookRule>, queue_capacity: usize) -> Self {
        let capacity = queue_capacity.max(MIN_QUEUE_CAPACITY);
        let (tx, mut rx) = mpsc::channel::<AsyncJob>(capacity);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                trace!(rule = %job.rule_name, path = %job.request.path, "running async after-hook");
            }
        });

        Self {
            rules,
            queue: tx,
            side_effect_in_flight: Arc::new(AtomicBool::new(false)),
            sink: None,
        }
    }

    /// Attach an event sink, invoked after every call with the final
    /// request and whether the inner provider call succeeded.
    #[must_use]
    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run all matching before-hooks in declared order, mutating
    /// `request.data` in place for matched `MutateWrite` rules. Returns
    /// `Err` on the first `Block`, before touching the underlying
    /// provider.
    pub fn run_before(&self, request: &mut HookRequest) -> Result<(), VfsError> {
        for rule in self.rules.iter().filter(|r| r.phase == Phase::Before) {
            if !rule.matches(request) {
                continue;
            }
            match rule.resolve_action(request) {
                Action::Allow => {}
                Action::Block { reason } => {
                    debug!(rule = %rule.name, path = %request.path, "hook blocked operation");
                    return Err(VfsError::PermissionDenied(reason));
                }
                action @ Action::MutateWrite(_) => {
                    if let Some(bytes) = action.resolve_write(request) {
                        request.data = Some(bytes);
                    }
                }
            }
        }
        Ok(())
    }

    /// Run all matching after-hooks, then invoke the event sink.
    /// Synchronous hooks run inline; `async_mode` hooks are enqueued
    /// and dropped silently if the queue is full.
    pub fn run_after(&self, request: &HookRequest, success: bool) {
        for rule in self.rules.iter().filter(|r| r.phase == Phase::After) {
            if !rule.matches(request) {
                continue;
            }
            if rule.side_effect {
                if self.side_effect_in_flight.swap(true, Ordering::AcqRel) {
                    trace!(rule = %rule.name, "skipping re-entrant side-effect hook");
                    continue;
                }
                self.run_one_after(rule, request);
                self.side_effect_in_flight.store(false, Ordering::Release);
            } else {
                self.run_one_after(rule, request);
            }
        }

        if let Some(sink) = &self.sink {
            sink(request, success);
        }
    }

    fn run_one_after(&self, rule: &HookRule, request: &HookRequest) {
        if rule.async_mode {
            let job = AsyncJob {
                rule_name: rule.name.clone(),
                request: request.clone(),
            };
            if self.queue.try_send(job).is_err() {
                warn!(rule = %rule.name, "after-hook queue full, dropping hook run");
            }
        } else {
            trace!(rule = %rule.name, path = %request.path, "running sync after-hook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::VfsOp;

    #[tokio::test]
    async fn block_rule_stops_before_touching_provider() {
        let rules = vec![HookRule::new(
            "deny-etc",
            Phase::Before,
            Action::block("no"),
        )
        .with_path_glob("/etc/**")];
        let engine = HookEngine::new(rules, 0);

        let mut req = HookRequest::new(VfsOp::Write, "/etc/shadow");
        let err = engine.run_before(&mut req).unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn mutate_write_replaces_data_before_subsequent_hooks_see_it() {
        let rules = vec![HookRule::new(
            "redact",
            Phase::Before,
            Action::mutate_static(b"REDACTED".to_vec()),
        )
        .with_ops(vec![VfsOp::Write])];
        let engine = HookEngine::new(rules, 0);

        let mut req = HookRequest::new(VfsOp::Write, "/f").with_data(b"secret".to_vec());
        engine.run_before(&mut req).unwrap();
        assert_eq!(req.data.as_deref(), Some(&b"REDACTED"[..]));
    }

    #[tokio::test]
    async fn side_effect_hooks_are_skipped_while_already_in_flight() {
        let rules = vec![HookRule::new("log-writes", Phase::After, Action::Allow).side_effect()];
        let engine = HookEngine::new(rules, 0);

        engine.side_effect_in_flight.store(true, Ordering::Release);
        let req = HookRequest::new(VfsOp::Write, "/f");
        engine.run_after(&req, true);
        assert!(
            engine.side_effect_in_flight.load(Ordering::Acquire),
            "a rule that never got to run must not clear a flag it didn't set"
        );
    }

    #[tokio::test]
    async fn side_effect_hooks_toggle_the_guard_on_and_off() {
        let rules = vec![HookRule::new("log-writes", Phase::After, Action::Allow).side_effect()];
        let engine = HookEngine::new(rules, 0);

        let req = HookRequest::new(VfsOp::Write, "/f");
        engine.run_after(&req, true);
        assert!(!engine.side_effect_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn sink_runs_once_per_call_regardless_of_matching_rule_count() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_clone = calls.clone();
        let rules = vec![HookRule::new("log-writes", Phase::After, Action::Allow)];
        let engine = HookEngine::new(rules, 0).with_sink(Arc::new(move |_req, _ok| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        }));

        let req = HookRequest::new(VfsOp::Write, "/f");
        engine.run_after(&req, true);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
