//! Secret table: name → `{value, placeholder, host-glob-list}`.

use std::collections::HashMap;

use matchlock_core::glob;
use rand::RngCore;

const PLACEHOLDER_PREFIX: &str = "SANDBOX_SECRET_";
const PLACEHOLDER_HEX_LEN: usize = 32;

/// One registered secret. The real value is never exposed through `Debug`
/// or any serialization path; only [`Secret::placeholder`] is meant to
/// leave this crate.
#[derive(Clone)]
pub struct Secret {
    value: String,
    placeholder: String,
    hosts: Vec<String>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("placeholder", &self.placeholder)
            .field("hosts", &self.hosts)
            .finish_non_exhaustive()
    }
}

impl Secret {
    /// The token the guest sees in place of the real value.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// `true` if `host` is on this secret's allow-list.
    #[must_use]
    pub fn allows_host(&self, host: &str) -> bool {
        glob::matches_any(self.hosts.iter().map(String::as_str), host)
    }
}

/// Generates a fresh `SANDBOX_SECRET_` + 32 hex-char placeholder using
/// cryptographic randomness.
fn generate_placeholder() -> String {
    let mut bytes = [0u8; PLACEHOLDER_HEX_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(PLACEHOLDER_PREFIX.len() + PLACEHOLDER_HEX_LEN);
    out.push_str(PLACEHOLDER_PREFIX);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The policy engine's secret table. Read-mostly after construction;
/// placeholders are generated lazily at insertion time if not supplied.
#[derive(Debug, Clone, Default)]
pub struct SecretTable {
    by_name: HashMap<String, Secret>,
}

impl SecretTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret, generating a unique placeholder if `placeholder`
    /// is `None`. Returns the placeholder the guest should be given.
    ///
    /// # Panics
    ///
    /// Panics if a generated placeholder happens to collide with an
    /// existing one after a bounded number of retries; this would
    /// indicate a broken random source, not a normal runtime condition.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        placeholder: Option<String>,
        hosts: Vec<String>,
    ) -> String {
        let placeholder = placeholder.unwrap_or_else(|| self.unique_placeholder());
        let secret = Secret {
            value: value.into(),
            placeholder: placeholder.clone(),
            hosts,
        };
        self.by_name.insert(name.into(), secret);
        placeholder
    }

    fn unique_placeholder(&self) -> String {
        for _ in 0..16 {
            let candidate = generate_placeholder();
            if !self.by_name.values().any(|s| s.placeholder == candidate) {
                return candidate;
            }
        }
        panic!("failed to generate a unique secret placeholder after 16 attempts");
    }

    /// Iterate over all registered secrets.
    pub fn iter(&self) -> impl Iterator<Item = &Secret> {
        self.by_name.values()
    }

    /// Look up a secret's real value by its placeholder token.
    #[must_use]
    pub fn value_for_placeholder(&self, placeholder: &str) -> Option<&str> {
        self.by_name
            .values()
            .find(|s| s.placeholder == placeholder)
            .map(|s| s.value.as_str())
    }
}
