//! Host-string helpers shared by the policy engine and proxy.

use std::net::IpAddr;

/// Strips a trailing `:port` from a host string, if present.
///
/// IPv6 literals (`[::1]:443`) are handled by stripping the bracket form
/// first; a bare IPv6 literal without brackets (no port) is returned as-is.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    if let Some(stripped) = host.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return &stripped[..end];
        }
    }
    match host.rsplit_once(':') {
        // Only strip if what remains doesn't itself look like an IPv6
        // literal (which would contain further colons).
        Some((h, port)) if !h.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    }
}

/// Returns `true` if `addr` is a loopback, private, or link-local address.
///
/// IPv4-mapped and IPv4-compatible IPv6 addresses are unwrapped to their
/// IPv4 form first, so `::ffff:10.0.0.1` is correctly treated as private.
#[must_use]
pub fn is_private_address(addr: IpAddr) -> bool {
    let addr = match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .or_else(|| v6.to_ipv4())
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    };

    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unicast_link_local()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
        }
    }
}

/// Returns `Some(addr)` if `host` parses directly as an IP literal.
#[must_use]
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    host.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_v4_port() {
        assert_eq!(strip_port("api.openai.com:443"), "api.openai.com");
        assert_eq!(strip_port("api.openai.com"), "api.openai.com");
    }

    #[test]
    fn strips_bracketed_v6_port() {
        assert_eq!(strip_port("[::1]:443"), "::1");
    }

    #[test]
    fn leaves_bare_v6_alone() {
        assert_eq!(strip_port("::1"), "::1");
    }

    #[test]
    fn detects_private_v4() {
        assert!(is_private_address("127.0.0.1".parse().unwrap()));
        assert!(is_private_address("10.0.0.5".parse().unwrap()));
        assert!(is_private_address("169.254.1.1".parse().unwrap()));
        assert!(!is_private_address("8.8.8.8".parse().unwrap()));
    }
}
