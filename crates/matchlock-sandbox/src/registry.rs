//! The in-process record of which sandbox IDs are currently live.
//!
//! This is deliberately not a database: persisting the VM registry in
//! SQLite is an external collaborator (spec §1). This registry only
//! guards against two sandboxes sharing one ID in the same process and
//! gives the "state registry unregister" cleanup step something real to
//! do.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

fn registry() -> &'static Mutex<HashSet<String>> {
    static REGISTRY: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

fn lock() -> std::sync::MutexGuard<'static, HashSet<String>> {
    registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Register `id` as live. Returns `false` if it was already registered.
pub(crate) fn register(id: &str) -> bool {
    lock().insert(id.to_string())
}

/// Unregister `id`. Idempotent: unregistering an absent ID is not an error.
pub(crate) fn unregister(id: &str) {
    lock().remove(id);
}

#[cfg(test)]
pub(crate) fn is_registered(id: &str) -> bool {
    lock().contains(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicate_id() {
        let id = "test-sandbox-registry-dup";
        assert!(register(id));
        assert!(!register(id));
        unregister(id);
        assert!(!is_registered(id));
    }
}
