//! Daemon configuration compiler
//!
//! Pure functions from settings and resolved network facts to the ordered
//! directive lines of the server configuration and of client
//! configurations. A directive governed by a boolean that is switched off
//! is kept in the output, commented out with `;`, so the generated file
//! documents every toggle and can be flipped by hand.

use crate::netfacts::NetworkFacts;
use ovpnctl_settings::schema::{self, DeviceType, Protocol};
use ovpnctl_settings::Settings;
use std::path::Path;

/// Prefix that disables a directive
pub const COMMENT: char = ';';

/// Marker line opening the verbatim extra options block
pub const EXTRA_OPTIONS_MARKER: &str = "# Extra options";

const DEFAULT_PORT: u16 = 1194;

/// Typed view of the settings that shape the daemon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOptions {
    /// Listen port
    pub port: u16,
    /// Transport
    pub protocol: Protocol,
    /// Virtual device type
    pub device: DeviceType,
    /// IPv6 wanted
    pub enable_ipv6: bool,
    /// Compression directive enabled
    pub compression: bool,
    /// Allow several clients with the same certificate
    pub duplicate_cn: bool,
    /// Authenticate clients against system logins
    pub pam_authentication: bool,
    /// Daemon verbosity
    pub verbosity: u8,
    /// VPN subnet address
    pub vpn_network: String,
    /// VPN subnet mask
    pub vpn_mask: String,
    /// Interface whose addresses are used for routing and NAT
    pub gateway_interface: String,
    /// Push a default gateway redirect
    pub default_gateway: bool,
    /// Push a route to the gateway's local network
    pub default_route: bool,
    /// Let clients reach each other
    pub client_to_client: bool,
    /// Selected DNS profile
    pub dns_server: String,
    /// Extra DNS servers
    pub dns: Vec<String>,
    /// Search domains
    pub dns_domains: Vec<String>,
    /// WINS servers
    pub wins: Vec<String>,
    /// Address clients connect to
    pub public_address: String,
    /// Raw directive lines appended verbatim
    pub extra_options: Vec<String>,
}

impl GatewayOptions {
    /// Read the typed view out of a settings document
    pub fn from_settings(settings: &Settings) -> Self {
        let port = settings
            .int("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or_else(|| {
                tracing::warn!("Invalid port {:?}, using {}", settings.text("port"), DEFAULT_PORT);
                DEFAULT_PORT
            });
        let protocol = settings.text("protocol").parse().unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Protocol::default()
        });
        let device = settings.text("deviceovpn").parse().unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            DeviceType::default()
        });

        Self {
            port,
            protocol,
            device,
            enable_ipv6: settings.flag("enable_ipv6"),
            compression: settings.flag("compression"),
            duplicate_cn: settings.flag("duplicate_cn"),
            pam_authentication: settings.flag("pam_authentication"),
            verbosity: schema::log_verbosity(&settings.text("loglevel")),
            vpn_network: settings.text("vpn_network"),
            vpn_mask: settings.text("vpn_mask"),
            gateway_interface: settings.text("gateway_interface"),
            default_gateway: settings.flag("default_gateway"),
            default_route: settings.flag("default_route"),
            client_to_client: settings.flag("client_to_client"),
            dns_server: settings.text("dns_server"),
            dns: settings.list("dns"),
            dns_domains: settings.list("dns_domains"),
            wins: settings.list("wins"),
            public_address: settings.text("public_address"),
            extra_options: settings.list("extra_options"),
        }
    }

    /// IPv6 VPN subnet, derived from the port.
    ///
    /// Ports up to 9999 are spelled in decimal, which is also a valid hex
    /// group. Larger ports would need five digits, so they are spelled in hex.
    pub fn ipv6_network(&self) -> String {
        let group = if self.port <= 9999 {
            self.port.to_string()
        } else {
            format!("{:x}", self.port)
        };
        format!("fddd:{0}:{0}:{0}::/64", group)
    }
}

/// Installation details the server configuration refers to
#[derive(Debug, Clone)]
pub struct ServerContext<'a> {
    /// Certificate authority directory
    pub pki_dir: &'a Path,
    /// Server identity name
    pub server_name: &'a str,
    /// PAM authentication plugin
    pub pam_plugin: &'a Path,
    /// Daemon status file
    pub status_log: &'a str,
    /// Daemon log file
    pub daemon_log: &'a str,
    /// Addresses resolved from the selected DNS profile
    pub profile_dns: &'a [String],
}

/// Credential section of a client configuration
#[derive(Debug, Clone, Copy)]
pub enum Credentials<'a> {
    /// Refer to the files shipped next to the configuration
    Files,
    /// Embed the PEM material
    Inline {
        /// CA certificate
        ca: &'a str,
        /// Client certificate
        cert: &'a str,
        /// Client private key
        key: &'a str,
    },
}

fn toggle(line: impl Into<String>, enabled: bool) -> String {
    let line = line.into();
    if enabled {
        line
    } else {
        format!("{}{}", COMMENT, line)
    }
}

/// Network part of `ip` under `mask`, octet by octet. Empty when either
/// side is not a dotted quad.
pub fn subnet(ip: &str, mask: &str) -> String {
    let octets = |s: &str| -> Option<Vec<u8>> {
        let parts: Vec<u8> = s.split('.').map(|o| o.parse().ok()).collect::<Option<_>>()?;
        (parts.len() == 4).then_some(parts)
    };
    match (octets(ip), octets(mask)) {
        (Some(ip), Some(mask)) => ip
            .iter()
            .zip(&mask)
            .map(|(i, m)| (i & m).to_string())
            .collect::<Vec<_>>()
            .join("."),
        _ => String::new(),
    }
}

/// Whether IPv6 directives apply for these facts
pub fn ipv6_active(opts: &GatewayOptions, facts: &NetworkFacts) -> bool {
    opts.enable_ipv6 && facts.ipv6.as_deref().is_some_and(|a| !a.is_empty())
}

// ─── Server ──────────────────────────────────────────────────────────────────

/// Ordered server configuration directives
pub fn compile_server(opts: &GatewayOptions, facts: &NetworkFacts, ctx: &ServerContext<'_>) -> Vec<String> {
    let pki = ctx.pki_dir.display();
    let ipv6 = ipv6_active(opts, facts);
    let mut conf = vec![
        format!("port {}", opts.port),
        format!("proto {}", opts.protocol),
        format!("dev {}", opts.device),
        format!("ca \"{}/ca.crt\"", pki),
        format!("cert \"{}/issued/{}.crt\"", pki, ctx.server_name),
        format!("key \"{}/private/{}.key\" # This file should be kept secret", pki, ctx.server_name),
        format!("dh \"{}/dh.pem\"", pki),
        "topology subnet".to_string(),
        format!("server {} {}", opts.vpn_network, opts.vpn_mask),
    ];

    conf.push(if opts.duplicate_cn {
        "duplicate-cn".to_string()
    } else {
        "ifconfig-pool-persist ipp.txt".to_string()
    });

    conf.push(toggle(
        format!("push \"route {} {}\"", subnet(&facts.ipv4, &facts.netmask), facts.netmask),
        opts.default_route,
    ));

    if ipv6 {
        conf.push(format!("server-ipv6 {}", opts.ipv6_network()));
    }

    let redirect = if ipv6 {
        "push \"redirect-gateway def1 ipv6 bypass-dhcp\""
    } else {
        "push \"redirect-gateway def1 bypass-dhcp\""
    };
    conf.push(toggle(redirect, opts.default_gateway));

    for address in ctx.profile_dns.iter().chain(&opts.dns) {
        conf.push(format!("push \"dhcp-option DNS {}\"", address));
    }
    for domain in &opts.dns_domains {
        conf.push(format!("push \"dhcp-option DOMAIN {}\"", domain));
    }
    for address in &opts.wins {
        conf.push(format!("push \"dhcp-option WINS {}\"", address));
    }

    conf.push(toggle("client-to-client", opts.client_to_client));
    conf.push("keepalive 10 120".to_string());
    conf.push(toggle("comp-lzo", opts.compression));
    conf.push(toggle(
        format!("plugin {} login", ctx.pam_plugin.display()),
        opts.pam_authentication,
    ));
    conf.push("user nobody".to_string());
    conf.push("group nogroup".to_string());
    conf.push("persist-key".to_string());
    conf.push(toggle("persist-tun", opts.device == DeviceType::Tun));
    conf.push(format!("status {}", ctx.status_log));
    conf.push(format!("log {}", ctx.daemon_log));
    conf.push(format!("verb {}", opts.verbosity));
    conf.push("mute 10".to_string());
    conf.push(format!("crl-verify \"{}/crl.pem\"", pki));
    conf.push(String::new());

    if !opts.extra_options.is_empty() {
        conf.push(EXTRA_OPTIONS_MARKER.to_string());
        conf.extend(opts.extra_options.iter().cloned());
        conf.push(String::new());
    }

    conf
}

/// Server configuration file content, one directive per line
pub fn render_server(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Ordered client configuration directives for identity `name`
pub fn compile_client(name: &str, opts: &GatewayOptions, credentials: Credentials<'_>) -> Vec<String> {
    let mut conf = vec![
        "client".to_string(),
        format!("remote {} {}", opts.public_address, opts.port),
        format!("proto {}", opts.protocol),
        format!("dev {}", opts.device),
        "remote-cert-tls server".to_string(),
        toggle("comp-lzo", opts.compression),
        toggle("auth-user-pass", opts.pam_authentication),
        "persist-key".to_string(),
        toggle("persist-tun", opts.device == DeviceType::Tun),
        "nobind".to_string(),
        "resolv-retry infinite".to_string(),
        "auth-nocache".to_string(),
        "verb 3".to_string(),
        "mute 10".to_string(),
    ];

    match credentials {
        Credentials::Files => {
            conf.push(format!("ca   {}-ca.crt", name));
            conf.push(format!("cert {}-client.crt", name));
            conf.push(format!("key  {}-client.key", name));
        }
        Credentials::Inline { ca, cert, key } => {
            for (tag, pem) in [("ca", ca), ("cert", cert), ("key", key)] {
                conf.push(format!("<{}>", tag));
                conf.push(pem.to_string());
                conf.push(format!("</{}>", tag));
            }
        }
    }

    conf.push(String::new());
    conf.push(String::new());
    conf
}

/// Client configuration file content
pub fn render_client(lines: &[String]) -> String {
    lines.join("\n")
}
