//! Filesystem layout of a gateway installation
//!
//! Every artefact has exactly one location. Production code uses
//! [`Layout::system`]; tests re-root the same tree under a scratch
//! directory with [`Layout::rooted`].

use ovpnctl_settings::SETTINGS_PATH;
use std::path::{Path, PathBuf};

/// Fallback server identity name when the host name cannot be read
pub const DEFAULT_HOSTNAME: &str = "server";

/// Locations of every file the gateway reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Settings document
    pub settings: PathBuf,
    /// Daemon configuration directory
    pub openvpn_dir: PathBuf,
    /// Certificate authority working directory
    pub pki_dir: PathBuf,
    /// Generated server configuration
    pub server_conf: PathBuf,
    /// Generated firewall service unit
    pub firewall_unit: PathBuf,
    /// Persistent forwarding switches
    pub sysctl_conf: PathBuf,
    /// Live IPv4 forwarding switch
    pub ipv4_forward: PathBuf,
    /// Live IPv6 forwarding switch
    pub ipv6_forward: PathBuf,
    /// Host name file
    pub hostname: PathBuf,
    /// Primary resolver configuration
    pub resolv_conf: PathBuf,
    /// Resolver configuration used when the primary lists no name servers
    pub resolv_conf_fallback: PathBuf,
    /// Account database
    pub passwd: PathBuf,
    /// Login policy (UID range)
    pub login_defs: PathBuf,
    /// Network interface directory
    pub net_class: PathBuf,
    /// Library tree searched for the PAM plugin
    pub lib_dir: PathBuf,
    /// Where client bundles are written
    pub tmp_dir: PathBuf,
}

impl Layout {
    /// Standard system locations
    pub fn system() -> Self {
        let openvpn_dir = PathBuf::from("/etc/openvpn");
        Self {
            settings: PathBuf::from(SETTINGS_PATH),
            pki_dir: openvpn_dir.join("pki"),
            server_conf: openvpn_dir.join("server.conf"),
            openvpn_dir,
            firewall_unit: PathBuf::from("/etc/systemd/system/openvpn-iptables.service"),
            sysctl_conf: PathBuf::from("/etc/sysctl.d/99-openvpn.conf"),
            ipv4_forward: PathBuf::from("/proc/sys/net/ipv4/ip_forward"),
            ipv6_forward: PathBuf::from("/proc/sys/net/ipv6/conf/all/forwarding"),
            hostname: PathBuf::from("/etc/hostname"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            resolv_conf_fallback: PathBuf::from("/run/systemd/resolve/resolv.conf"),
            passwd: PathBuf::from("/etc/passwd"),
            login_defs: PathBuf::from("/etc/login.defs"),
            net_class: PathBuf::from("/sys/class/net"),
            lib_dir: PathBuf::from("/usr/lib"),
            tmp_dir: PathBuf::from("/tmp"),
        }
    }

    /// The system layout re-rooted under `root`
    pub fn rooted(root: &Path) -> Self {
        let system = Self::system();
        let under = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        Self {
            settings: under(&system.settings),
            openvpn_dir: under(&system.openvpn_dir),
            pki_dir: under(&system.pki_dir),
            server_conf: under(&system.server_conf),
            firewall_unit: under(&system.firewall_unit),
            sysctl_conf: under(&system.sysctl_conf),
            ipv4_forward: under(&system.ipv4_forward),
            ipv6_forward: under(&system.ipv6_forward),
            hostname: under(&system.hostname),
            resolv_conf: under(&system.resolv_conf),
            resolv_conf_fallback: under(&system.resolv_conf_fallback),
            passwd: under(&system.passwd),
            login_defs: under(&system.login_defs),
            net_class: under(&system.net_class),
            lib_dir: under(&system.lib_dir),
            tmp_dir: under(&system.tmp_dir),
        }
    }

    /// Lock serializing every mutation of the PKI directory
    pub fn pki_lock(&self) -> PathBuf {
        self.openvpn_dir.join("pki.lock")
    }

    /// Server identity name, read from the host name file
    pub fn server_name(&self) -> String {
        std::fs::read_to_string(&self.hostname)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string())
    }
}
