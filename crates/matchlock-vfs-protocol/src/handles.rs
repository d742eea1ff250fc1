//! Maps the guest-facing handle integer to the provider's own
//! [`matchlock_vfs::Handle`]. This registry, not any individual
//! provider, owns the number the guest holds: it is monotonically
//! increasing, never reused, and forgotten on `Release`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use matchlock_vfs::Handle;

pub struct HandleRegistry {
    next: AtomicU64,
    live: DashMap<u64, Handle>,
}

impl HandleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: DashMap::new(),
        }
    }

    /// Register a freshly opened provider handle, returning the
    /// guest-facing integer for it.
    pub fn register(&self, provider_handle: Handle) -> u64 {
        let guest_handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.live.insert(guest_handle, provider_handle);
        guest_handle
    }

    #[must_use]
    pub fn resolve(&self, guest_handle: u64) -> Option<Handle> {
        self.live.get(&guest_handle).map(|entry| *entry)
    }

    /// Forget a guest handle, returning its provider handle if it was
    /// still registered.
    pub fn forget(&self, guest_handle: u64) -> Option<Handle> {
        self.live.remove(&guest_handle).map(|(_, handle)| handle)
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_reused() {
        let registry = HandleRegistry::new();
        let a = registry.register(Handle(10));
        let b = registry.register(Handle(11));
        assert_ne!(a, b);

        registry.forget(a);
        let c = registry.register(Handle(12));
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn forget_removes_the_mapping() {
        let registry = HandleRegistry::new();
        let a = registry.register(Handle(10));
        assert!(registry.resolve(a).is_some());
        registry.forget(a);
        assert!(registry.resolve(a).is_none());
    }
}
