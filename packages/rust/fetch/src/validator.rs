//! URL admission: scheme, domain allow-list, path blocklist, private hosts.

use std::net::IpAddr;

use tracing::debug;
use url::{Host, Url};

use askpage_shared::{AskPageError, PolicyConfig, Result};

/// Decides whether a requested URL may be fetched.
///
/// Built once from [`PolicyConfig`] and shared read-only across requests.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    /// Lowercased domain suffixes.
    domains: Vec<String>,
    /// Lowercased path substrings.
    blocked_paths: Vec<String>,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl UrlValidator {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            domains: policy.domains(),
            blocked_paths: policy
                .blocked_paths
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            allow_private_hosts: policy.allow_private_hosts,
        }
    }

    /// `true` if `url` parses and passes every rule. Never fails.
    pub fn validate(&self, url: &str) -> bool {
        self.permitted(url).is_some()
    }

    /// Like [`validate`](Self::validate), but returns the parsed URL or
    /// [`AskPageError::UrlNotPermitted`].
    pub fn check(&self, url: &str) -> Result<Url> {
        self.permitted(url)
            .ok_or_else(|| AskPageError::url_not_permitted(url))
    }

    /// The effective allow-list.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    fn permitted(&self, raw: &str) -> Option<Url> {
        let url = Url::parse(raw).ok()?;

        if url.scheme() != "http" && url.scheme() != "https" {
            debug!(%url, "rejected: scheme");
            return None;
        }

        let host = url.host_str()?.to_lowercase();
        // Substring match: `en.wikipedia.org` and `wikipedia.org.mirror.test` both pass.
        if !self.domains.iter().any(|d| host.contains(d.as_str())) {
            debug!(%url, "rejected: domain not allow-listed");
            return None;
        }

        let path = url.path().to_lowercase();
        if self.blocked_paths.iter().any(|p| path.contains(p.as_str())) {
            debug!(%url, "rejected: blocked path");
            return None;
        }

        if !self.allow_private_hosts && is_private_host(&url) {
            debug!(%url, "rejected: private host");
            return None;
        }

        Some(url)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a loopback, private, or local-only host.
fn is_private_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
