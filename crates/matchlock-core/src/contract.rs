//! Constants for the wire/filesystem contracts Matchlock offers to external
//! collaborators: the guest init, the guest agent, and the host launcher.
//!
//! Nothing in this module performs I/O; it only names the agreed-upon paths
//! and environment variable names so every crate (and the external VMM
//! launcher) refers to the same constants instead of re-stringifying them.

/// Path inside the guest rootfs where the CA certificate is installed.
pub const GUEST_CA_CERT_PATH: &str = "/etc/ssl/certs/matchlock-ca.crt";

/// File mode applied to every injected rootfs file except the CA cert.
pub const INJECTED_FILE_MODE: u32 = 0o100_755;

/// File mode applied to the injected CA certificate.
pub const INJECTED_CA_CERT_MODE: u32 = 0o644;

/// Environment variable names pointed at [`GUEST_CA_CERT_PATH`] inside the
/// guest so common HTTP clients trust the Matchlock MITM CA.
pub const GUEST_CA_ENV_VARS: &[&str] = &[
    "SSL_CERT_FILE",
    "REQUESTS_CA_BUNDLE",
    "CURL_CA_BUNDLE",
    "NODE_EXTRA_CA_CERTS",
];

/// Kernel cmdline key for the workspace mount point.
pub const CMDLINE_WORKSPACE: &str = "matchlock.workspace";
/// Kernel cmdline key for the comma-separated DNS resolver list.
pub const CMDLINE_DNS: &str = "matchlock.dns";
/// Kernel cmdline key for the guest network MTU.
pub const CMDLINE_MTU: &str = "matchlock.mtu";
/// Kernel cmdline key prefix for additional disk mounts (`matchlock.disk.<dev>`).
pub const CMDLINE_DISK_PREFIX: &str = "matchlock.disk.";
/// Kernel cmdline key signalling a privileged guest.
pub const CMDLINE_PRIVILEGED: &str = "matchlock.privileged";
