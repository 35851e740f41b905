//! Hosts whose traffic is intercepted.
//!
//! Only these exact hosts are TLS-terminated. Every other CONNECT is tunneled
//! without inspection.

/// Provider API hosts intercepted by default.
pub const INTERCEPT_HOSTS: &[&str] = &[
    "api.anthropic.com",
    "api.openai.com",
    "generativelanguage.googleapis.com",
];

/// Strips a `:port` suffix from a host.
pub fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

/// Checks if `host` is one of the default intercepted hosts.
///
/// Matching is exact and case-sensitive; a port suffix is ignored.
///
/// # Examples
///
/// ```
/// use arfa_proxy::is_intercepted_host;
///
/// assert!(is_intercepted_host("api.anthropic.com"));
/// assert!(is_intercepted_host("api.anthropic.com:443"));
/// assert!(!is_intercepted_host("anthropic.com"));
/// ```
pub fn is_intercepted_host(host: &str) -> bool {
    is_listed_host(INTERCEPT_HOSTS, host)
}

/// Checks `host` against an explicit host list.
pub fn is_listed_host<S: AsRef<str>>(hosts: &[S], host: &str) -> bool {
    let host = strip_port(host);
    hosts.iter().any(|h| h.as_ref() == host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercepts_provider_hosts() {
        for host in INTERCEPT_HOSTS {
            assert!(is_intercepted_host(host), "{} should be intercepted", host);
        }
    }

    #[test]
    fn ignores_port() {
        assert!(is_intercepted_host("api.openai.com:443"));
        assert!(is_intercepted_host("generativelanguage.googleapis.com:8443"));
    }

    #[test]
    fn matching_is_exact() {
        assert!(!is_intercepted_host("anthropic.com"));
        assert!(!is_intercepted_host("evil.api.anthropic.com"));
        assert!(!is_intercepted_host("api.anthropic.com.evil.net"));
        assert!(!is_intercepted_host("API.ANTHROPIC.COM"));
        assert!(!is_intercepted_host("claude.ai"));
        assert!(!is_intercepted_host(""));
    }

    #[test]
    fn custom_host_list() {
        let hosts = vec!["localhost".to_string()];
        assert!(is_listed_host(&hosts, "localhost:8080"));
        assert!(!is_listed_host(&hosts, "api.anthropic.com"));
    }
}
