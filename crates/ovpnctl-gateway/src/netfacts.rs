//! Network facts about the gateway interface
//!
//! Addresses are read from `ip -o addr show`, the same way the interface
//! status of a running tunnel is inspected. Nothing here is fatal: an
//! interface that cannot be resolved yields empty facts and the compiler
//! degrades accordingly.

use crate::shell::Shell;
use std::ffi::OsStr;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// Resolved addresses of one interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkFacts {
    /// IPv4 address (empty when unresolved)
    pub ipv4: String,
    /// IPv4 netmask in dotted-quad form (empty when unresolved)
    pub netmask: String,
    /// IPv6 address, when one was requested and found
    pub ipv6: Option<String>,
}

/// Source of interface names and addresses
pub trait NetworkFactsProvider {
    /// Names of all network interfaces
    fn interfaces(&self) -> Vec<String>;

    /// Addresses of `interface`; IPv6 is only looked up when `want_ipv6`
    fn facts(&self, interface: &str, want_ipv6: bool) -> NetworkFacts;
}

impl<T: NetworkFactsProvider + ?Sized> NetworkFactsProvider for &T {
    fn interfaces(&self) -> Vec<String> {
        (**self).interfaces()
    }

    fn facts(&self, interface: &str, want_ipv6: bool) -> NetworkFacts {
        (**self).facts(interface, want_ipv6)
    }
}

/// Facts from sysfs and the `ip` tool
#[derive(Debug, Clone)]
pub struct IpCommand {
    net_class: PathBuf,
    shell: Shell,
}

impl IpCommand {
    /// Enumerate interfaces under `net_class` (normally `/sys/class/net`)
    pub fn new(net_class: impl Into<PathBuf>) -> Self {
        Self {
            net_class: net_class.into(),
            shell: Shell::new(),
        }
    }

    fn addr_show(&self, family: &str, interface: &str) -> String {
        match self
            .shell
            .run(OsStr::new("ip"), &["-o", family, "addr", "show", "dev", interface])
        {
            Ok(out) if out.success() => out.stdout,
            Ok(out) => {
                tracing::debug!("ip {} addr show {} failed: {}", family, interface, out.stderr.trim());
                String::new()
            }
            Err(e) => {
                tracing::debug!("{}", e);
                String::new()
            }
        }
    }
}

impl NetworkFactsProvider for IpCommand {
    fn interfaces(&self) -> Vec<String> {
        list_interfaces(&self.net_class)
    }

    fn facts(&self, interface: &str, want_ipv6: bool) -> NetworkFacts {
        let (ipv4, netmask) = parse_ipv4(&self.addr_show("-4", interface)).unwrap_or_default();
        let ipv6 = if want_ipv6 {
            parse_ipv6(&self.addr_show("-6", interface))
        } else {
            None
        };
        NetworkFacts { ipv4, netmask, ipv6 }
    }
}

/// Interface names found in `net_class`, sorted
pub fn list_interfaces(net_class: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(net_class)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// First `inet a.b.c.d/len` of `ip -o -4 addr show` output as (address, netmask)
pub fn parse_ipv4(output: &str) -> Option<(String, String)> {
    output.lines().find_map(|line| {
        let cidr = token_after(line, "inet")?;
        let (addr, prefix) = cidr.split_once('/').unwrap_or((cidr, "32"));
        let prefix: u32 = prefix.parse().ok()?;
        Some((addr.to_string(), prefix_to_netmask(prefix)?))
    })
}

/// Global IPv6 address from `ip -o -6 addr show` output, else the first
/// routable one. Link-local and loopback addresses never count.
pub fn parse_ipv6(output: &str) -> Option<String> {
    let mut first = None;
    for line in output.lines() {
        let Some(cidr) = token_after(line, "inet6") else {
            continue;
        };
        let addr = cidr.split('/').next().unwrap_or(cidr);
        if !is_routable_ipv6(addr) || line.contains("scope link") || line.contains("scope host") {
            continue;
        }
        if line.contains("scope global") {
            return Some(addr.to_string());
        }
        first.get_or_insert_with(|| addr.to_string());
    }
    first
}

fn is_routable_ipv6(addr: &str) -> bool {
    match addr.parse::<Ipv6Addr>() {
        // fe80::/10
        Ok(ip) => !ip.is_loopback() && !ip.is_unspecified() && ip.segments()[0] & 0xffc0 != 0xfe80,
        Err(_) => false,
    }
}

/// Dotted-quad netmask for a prefix length
pub fn prefix_to_netmask(prefix: u32) -> Option<String> {
    if prefix > 32 {
        return None;
    }
    let bits = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    Some(Ipv4Addr::from(bits).to_string())
}

fn token_after<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    tokens.find(|t| *t == keyword)?;
    tokens.next()
}
