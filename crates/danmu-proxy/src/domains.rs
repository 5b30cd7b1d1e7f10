//! Hosts whose TLS traffic is decrypted.
//!
//! Everything else is tunnelled untouched, so the proxy can sit in front of
//! a whole browser without paying MITM cost for unrelated sites.
//!
//! Patterns:
//! - `**.douyin.com` matches `douyin.com` and any subdomain depth
//! - `*.douyin.com` matches `douyin.com` and exactly one subdomain level
//! - anything else is an exact host match

use std::fmt;

/// Hosts carrying the webcast push channel and room API.
pub const DOUYIN_HOSTS: &[&str] = &[
    "**.douyin.com",
    "**.iesdouyin.com",
    "**.amemv.com",
    "**.snssdk.com",
    "**.zijieapi.com",
];

/// A single host pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    AnyDepth(String),
    OneLevel(String),
    Exact(String),
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        if let Some(base) = pattern.strip_prefix("**.") {
            HostPattern::AnyDepth(base.to_string())
        } else if let Some(base) = pattern.strip_prefix("*.") {
            HostPattern::OneLevel(base.to_string())
        } else {
            HostPattern::Exact(pattern)
        }
    }

    /// Matches a host, ignoring any `:port` suffix and ASCII case.
    pub fn matches(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();

        match self {
            HostPattern::AnyDepth(base) => {
                host == *base || subdomain_prefix(&host, base).is_some()
            }
            HostPattern::OneLevel(base) => {
                host == *base
                    || subdomain_prefix(&host, base).is_some_and(|prefix| !prefix.contains('.'))
            }
            HostPattern::Exact(exact) => host == *exact,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::AnyDepth(base) => write!(f, "**.{}", base),
            HostPattern::OneLevel(base) => write!(f, "*.{}", base),
            HostPattern::Exact(host) => f.write_str(host),
        }
    }
}

/// Set of patterns deciding which CONNECT targets are intercepted.
///
/// An empty list intercepts every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllowList {
    patterns: Vec<HostPattern>,
}

impl HostAllowList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| HostPattern::parse(p.as_ref()))
                .filter(|p| !matches!(p, HostPattern::Exact(h) if h.is_empty()))
                .collect(),
        }
    }

    pub fn douyin() -> Self {
        Self::new(DOUYIN_HOSTS)
    }

    pub fn patterns(&self) -> &[HostPattern] {
        &self.patterns
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(host))
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

fn subdomain_prefix<'a>(host: &'a str, base: &str) -> Option<&'a str> {
    host.strip_suffix(base)?
        .strip_suffix('.')
        .filter(|prefix| !prefix.is_empty())
}
