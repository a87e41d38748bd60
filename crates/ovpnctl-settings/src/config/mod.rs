//! Tool configuration
//!
//! Locations of the external tools this gateway drives. Read from a single
//! optional TOML file; every field has a default, so a missing file (or a
//! missing section) simply means "use the stock paths".
//!
//! ```toml
//! [pki]
//! easyrsa = "/usr/share/easy-rsa/easyrsa"
//!
//! [daemon]
//! pam_plugin = "/usr/lib/openvpn/openvpn-plugin-auth-pam.so"
//! status_log = "/var/log/openvpn-status.log"
//! log = "/var/log/openvpn.log"
//!
//! [service]
//! timeout_secs = 30
//! ```

use crate::error::StoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed location of the tool configuration file
pub const TOOLS_CONFIG_PATH: &str = "/etc/ovpnctl.toml";

/// Top-level tool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Certificate authority tool settings
    #[serde(default)]
    pub pki: PkiToolConfig,

    /// VPN daemon settings
    #[serde(default)]
    pub daemon: DaemonToolConfig,

    /// Service manager settings
    #[serde(default)]
    pub service: ServiceToolConfig,
}

/// Certificate authority tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkiToolConfig {
    /// Path of the easy-rsa executable
    #[serde(default = "default_easyrsa")]
    pub easyrsa: String,
}

fn default_easyrsa() -> String {
    "/usr/share/easy-rsa/easyrsa".to_string()
}

impl Default for PkiToolConfig {
    fn default() -> Self {
        Self {
            easyrsa: default_easyrsa(),
        }
    }
}

/// VPN daemon settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonToolConfig {
    /// Preferred location of the PAM authentication plugin
    #[serde(default = "default_pam_plugin")]
    pub pam_plugin: String,

    /// Daemon status file
    #[serde(default = "default_status_log")]
    pub status_log: String,

    /// Daemon log file
    #[serde(default = "default_log")]
    pub log: String,
}

fn default_pam_plugin() -> String {
    "/usr/lib/openvpn/openvpn-plugin-auth-pam.so".to_string()
}

fn default_status_log() -> String {
    "/var/log/openvpn-status.log".to_string()
}

fn default_log() -> String {
    "/var/log/openvpn.log".to_string()
}

impl Default for DaemonToolConfig {
    fn default() -> Self {
        Self {
            pam_plugin: default_pam_plugin(),
            status_log: default_status_log(),
            log: default_log(),
        }
    }
}

/// Service manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceToolConfig {
    /// Upper bound for a single service manager call (0 = wait forever)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServiceToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load from the fixed system location
    pub fn load_system() -> StoreResult<Self> {
        Self::load(TOOLS_CONFIG_PATH)
    }

    /// Parse from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> StoreResult<Self> {
        Ok(toml::from_str(content)?)
    }
}
