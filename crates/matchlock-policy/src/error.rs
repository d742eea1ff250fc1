use thiserror::Error;

/// Errors raised while deciding or applying a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The effective host was not on the allowlist, or resolved to a
    /// private/loopback address that wasn't explicitly permitted.
    #[error("host not allowed: {0}")]
    NotAllowed(String),

    /// A secret's placeholder appeared in a request bound for a host not
    /// listed in that secret's host-glob list.
    #[error("secret placeholder sent to unauthorized host")]
    SecretLeak,
}
