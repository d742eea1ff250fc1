//! The opaque subnet/tap/firewall handles a [`crate::Sandbox`] owns but
//! never implements: NAT/TAP/nftables programming is an external
//! collaborator (spec §1). This is the seam the launcher hands its
//! already-acquired resources through so the sandbox can release them in
//! the right order during cleanup.

use async_trait::async_trait;

/// One externally-acquired resource the sandbox must release, in
/// acquisition order, during cleanup.
#[async_trait]
pub trait ExternalResource: Send {
    /// Label used in the cleanup log (e.g. `"tap-device"`, `"subnet-lease"`).
    fn name(&self) -> &str;

    /// Release the resource. Called at most once.
    async fn release(self: Box<Self>) -> Result<(), anyhow::Error>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::ExternalResource;

    /// A fake external resource for tests: records whether it was
    /// released, and optionally fails.
    pub struct RecordingResource {
        name: String,
        released: Arc<AtomicBool>,
        fail: bool,
    }

    impl RecordingResource {
        pub fn new(name: impl Into<String>, fail: bool) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    name: name.into(),
                    released: Arc::clone(&released),
                    fail,
                },
                released,
            )
        }
    }

    #[async_trait::async_trait]
    impl ExternalResource for RecordingResource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn release(self: Box<Self>) -> Result<(), anyhow::Error> {
            self.released.store(true, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} failed to release", self.name);
            }
            Ok(())
        }
    }
}
