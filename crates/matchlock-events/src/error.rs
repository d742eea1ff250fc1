use thiserror::Error;

/// Errors surfaced by lifecycle transitions and cleanup joins.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A transition was refused. Logged and returned, but never blocks
    /// subsequent cleanup steps.
    #[error("invalid lifecycle transition: {0}")]
    Invariant(String),

    /// One or more cleanup steps failed; their errors are joined here in
    /// the order the steps ran.
    #[error("cleanup completed with {} failed step(s): {}", .0.len(), join(.0))]
    CleanupJoined(Vec<String>),
}

fn join(errors: &[String]) -> String {
    errors.join("; ")
}
