//! DNS profiles pushed to clients

use std::path::Path;

/// Profile that reads the host's own resolvers
pub const SYSTEM_RESOLVERS: &str = "Current system resolvers";

/// Named DNS profiles in display order; the system profile resolves live
pub const PROFILES: [(&str, &[&str]); 7] = [
    ("None", &[]),
    (SYSTEM_RESOLVERS, &[]),
    ("Google", &["8.8.8.8", "8.8.4.4"]),
    ("1.1.1.1", &["1.1.1.1", "1.0.0.1"]),
    ("OpenDNS", &["208.67.222.222", "208.67.220.220"]),
    ("Quad9", &["9.9.9.9", "149.112.112.112"]),
    ("AdGuard", &["94.140.14.14", "94.140.15.15"]),
];

const KEYWORD: &str = "nameserver";

/// Profile names in display order
pub fn profile_names() -> Vec<&'static str> {
    PROFILES.iter().map(|(name, _)| *name).collect()
}

/// Whether `name` is a known profile
pub fn is_profile(name: &str) -> bool {
    PROFILES.iter().any(|(n, _)| *n == name)
}

/// Addresses for a profile; unknown profiles resolve to nothing
pub fn resolve_profile(name: &str, primary: &Path, fallback: &Path) -> Vec<String> {
    if name == SYSTEM_RESOLVERS {
        return system_resolvers(primary, fallback);
    }
    PROFILES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, addrs)| addrs.iter().map(|a| a.to_string()).collect())
        .unwrap_or_default()
}

/// Name servers from the primary resolver file, or from the fallback file
/// when the primary mentions none
pub fn system_resolvers(primary: &Path, fallback: &Path) -> Vec<String> {
    let mut content = std::fs::read_to_string(primary).unwrap_or_default();
    if !content.lines().any(|l| l.contains(KEYWORD)) {
        tracing::debug!("No name servers in {}, trying {}", primary.display(), fallback.display());
        content = std::fs::read_to_string(fallback).unwrap_or_default();
    }
    parse_nameservers(&content)
}

/// Extract the address after each `nameserver` keyword that is not commented out
pub fn parse_nameservers(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let start = line.find(KEYWORD)? + KEYWORD.len();
            if matches!(line.find('#'), Some(hash) if hash <= start) {
                return None;
            }
            line[start..].split_whitespace().next().map(str::to_string)
        })
        .collect()
}
