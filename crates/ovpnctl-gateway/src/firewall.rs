//! Firewall unit and host forwarding
//!
//! NAT and forwarding rules live in a oneshot service unit whose start
//! action inserts each rule and whose stop action deletes the same rule,
//! so stopping the unit always restores the previous rule set.

use crate::compiler::{ipv6_active, GatewayOptions};
use crate::netfacts::NetworkFacts;
use std::path::{Path, PathBuf};

/// Default iptables location when it is not on the search path
pub const IPTABLES: &str = "/usr/sbin/iptables";

/// Default ip6tables location when it is not on the search path
pub const IP6TABLES: &str = "/usr/sbin/ip6tables";

/// Firewall tool locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallTools {
    /// IPv4 rule tool
    pub iptables: PathBuf,
    /// IPv6 rule tool
    pub ip6tables: PathBuf,
}

impl FirewallTools {
    /// Locate the tools on the search path, falling back to the standard locations
    pub fn locate() -> Self {
        Self {
            iptables: which::which("iptables").unwrap_or_else(|_| PathBuf::from(IPTABLES)),
            ip6tables: which::which("ip6tables").unwrap_or_else(|_| PathBuf::from(IP6TABLES)),
        }
    }
}

impl Default for FirewallTools {
    fn default() -> Self {
        Self {
            iptables: PathBuf::from(IPTABLES),
            ip6tables: PathBuf::from(IP6TABLES),
        }
    }
}

/// A rule inserted on start and deleted on stop
struct Rule {
    start: String,
    stop: String,
}

impl Rule {
    fn new(start: String, stop: String) -> Self {
        Self { start, stop }
    }
}

fn ipv4_rules(opts: &GatewayOptions, facts: &NetworkFacts) -> Vec<Rule> {
    let net = format!("{}/24", opts.vpn_network);
    vec![
        Rule::new(
            format!("-t nat -A POSTROUTING -s {0} ! -d {0} -j SNAT --to {1}", net, facts.ipv4),
            format!("-t nat -D POSTROUTING -s {0} ! -d {0} -j SNAT --to {1}", net, facts.ipv4),
        ),
        Rule::new(
            format!("-I INPUT -p {} --dport {} -j ACCEPT", opts.protocol, opts.port),
            format!("-D INPUT -p {} --dport {} -j ACCEPT", opts.protocol, opts.port),
        ),
        Rule::new(
            format!("-I FORWARD -s {} -j ACCEPT", net),
            format!("-D FORWARD -s {} -j ACCEPT", net),
        ),
        established(),
    ]
}

fn ipv6_rules(opts: &GatewayOptions, facts: &NetworkFacts) -> Vec<Rule> {
    let Some(ip6) = facts.ipv6.as_deref().filter(|_| ipv6_active(opts, facts)) else {
        return Vec::new();
    };
    let net = opts.ipv6_network();
    vec![
        Rule::new(
            format!("-t nat -A POSTROUTING -s {0} ! -d {0} -j SNAT --to {1}", net, ip6),
            format!("-t nat -D POSTROUTING -s {0} ! -d {0} -j SNAT --to {1}", net, ip6),
        ),
        Rule::new(
            format!("-I FORWARD -s {} -j ACCEPT", net),
            format!("-D FORWARD -s {} -j ACCEPT", net),
        ),
        established(),
    ]
}

fn established() -> Rule {
    Rule::new(
        "-I FORWARD -m state --state RELATED,ESTABLISHED -j ACCEPT".to_string(),
        "-D FORWARD -m state --state RELATED,ESTABLISHED -j ACCEPT".to_string(),
    )
}

/// Service unit lines installing the NAT and forwarding rules
pub fn render_unit(opts: &GatewayOptions, facts: &NetworkFacts, tools: &FirewallTools) -> Vec<String> {
    let mut unit = vec![
        "[Unit]".to_string(),
        "Before=network.target".to_string(),
        "[Service]".to_string(),
        "Type=oneshot".to_string(),
    ];

    // Each family is grouped: all starts, then all stops
    let families = [
        (tools.iptables.display(), ipv4_rules(opts, facts)),
        (tools.ip6tables.display(), ipv6_rules(opts, facts)),
    ];
    for (tool, rules) in &families {
        unit.extend(rules.iter().map(|r| format!("ExecStart={} {}", tool, r.start)));
        unit.extend(rules.iter().map(|r| format!("ExecStop={} {}", tool, r.stop)));
    }

    unit.push("RemainAfterExit=yes".to_string());
    unit.push("[Install]".to_string());
    unit.push("WantedBy=multi-user.target".to_string());
    unit
}

/// Persistent forwarding switches for `/etc/sysctl.d`
pub fn render_sysctl(ipv6: bool) -> String {
    let mut out = String::from("net.ipv4.ip_forward=1\n");
    if ipv6 {
        out.push_str("net.ipv6.conf.all.forwarding=1\n");
    }
    out
}

/// Flip the live forwarding switches
pub fn enable_forwarding(ipv4_switch: &Path, ipv6_switch: Option<&Path>) -> std::io::Result<()> {
    std::fs::write(ipv4_switch, "1")?;
    if let Some(switch) = ipv6_switch {
        std::fs::write(switch, "1")?;
    }
    Ok(())
}
