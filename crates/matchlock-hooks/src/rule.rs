//! Hook rule definitions. The rule set is frozen once a [`crate::HookEngine`]
//! is built from it — rules cannot be added or removed afterward.

use std::sync::Arc;

use globset::Glob;

use crate::request::{HookRequest, VfsOp};

/// When in a call's lifecycle a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

/// What a before-hook does once it matches.
#[derive(Clone)]
pub enum Action {
    Allow,
    Block { reason: String },
    /// Replace the write payload before it reaches the inner provider.
    MutateWrite(WriteReplacement),
}

/// Source of replacement bytes for a `MutateWrite` action.
#[derive(Clone)]
pub enum WriteReplacement {
    Static(Vec<u8>),
    Callback(Arc<dyn Fn(&HookRequest) -> Vec<u8> + Send + Sync>),
}

impl WriteReplacement {
    fn resolve(&self, req: &HookRequest) -> Vec<u8> {
        match self {
            Self::Static(bytes) => bytes.clone(),
            Self::Callback(callback) => callback(req),
        }
    }
}

/// A per-request callback that overrides a rule's static `action`.
pub type DynamicAction = Arc<dyn Fn(&HookRequest) -> Action + Send + Sync>;

/// A single hook: when it fires, what it matches, and what it does.
#[derive(Clone)]
pub struct HookRule {
    pub name: String,
    pub phase: Phase,
    /// Ops this rule matches; empty means "any op".
    pub ops: Vec<VfsOp>,
    /// Shell-style glob over the cleaned path; `None` means "any path".
    pub path_glob: Option<Glob>,
    pub action: Action,
    /// Overrides `action` per-request when present.
    pub dynamic_action: Option<DynamicAction>,
    /// Run on the engine's worker queue instead of the caller's task.
    pub async_mode: bool,
    /// Suppressed from re-entering while a side-effect hook of the same
    /// tag is already in flight on this engine.
    pub side_effect: bool,
}

impl HookRule {
    #[must_use]
    pub fn new(name: impl Into<String>, phase: Phase, action: Action) -> Self {
        Self {
            name: name.into(),
            phase,
            ops: Vec::new(),
            path_glob: None,
            action,
            dynamic_action: None,
            async_mode: false,
            side_effect: false,
        }
    }

    #[must_use]
    pub fn with_ops(mut self, ops: Vec<VfsOp>) -> Self {
        self.ops = ops;
        self
    }

    /// Set the path glob. `glob` must be a valid shell-style pattern;
    /// an invalid one makes the rule never match, since a
    /// misconfigured hook should fail closed rather than match
    /// everything.
    #[must_use]
    pub fn with_path_glob(mut self, glob: &str) -> Self {
        self.path_glob = Glob::new(glob).ok();
        self
    }

    #[must_use]
    pub fn with_dynamic_action(mut self, callback: DynamicAction) -> Self {
        self.dynamic_action = Some(callback);
        self
    }

    #[must_use]
    pub fn async_mode(mut self) -> Self {
        self.async_mode = true;
        self
    }

    #[must_use]
    pub fn side_effect(mut self) -> Self {
        self.side_effect = true;
        self
    }

    /// `true` when this rule matches `request`'s op and cleaned path.
    #[must_use]
    pub fn matches(&self, request: &HookRequest) -> bool {
        let op_matches = self.ops.is_empty() || self.ops.contains(&request.op);
        let path_matches = match &self.path_glob {
            Some(glob) => glob.compile_matcher().is_match(&request.path),
            None => true,
        };
        op_matches && path_matches
    }

    /// Resolve this rule's action for `request`, preferring the dynamic
    /// callback when one is configured.
    #[must_use]
    pub fn resolve_action(&self, request: &HookRequest) -> Action {
        self.dynamic_action
            .as_ref()
            .map_or_else(|| self.action.clone(), |callback| callback(request))
    }
}

impl Action {
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn mutate_static(bytes: Vec<u8>) -> Self {
        Self::MutateWrite(WriteReplacement::Static(bytes))
    }

    pub(crate) fn resolve_write(&self, request: &HookRequest) -> Option<Vec<u8>> {
        match self {
            Self::MutateWrite(replacement) => Some(replacement.resolve(request)),
            _ => None,
        }
    }
}
