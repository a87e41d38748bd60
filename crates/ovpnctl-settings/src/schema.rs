//! Default settings schema and the closed option sets

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comment block written at the top of a freshly created settings file
pub const DEFAULT_HEADER: &str = "This XML file contains the settings for openvpn automation.\n            Do not edit this file manually!!!";

/// Option keys whose values are delimited lists
pub const LIST_KEYS: [&str; 4] = ["extra_options", "dns", "dns_domains", "wins"];

/// Key holding the client registry
pub const CLIENTS_KEY: &str = "clients";

/// Named daemon verbosity levels, in ascending order
pub const LOG_LEVELS: [(u8, &str); 4] = [
    (0, "No output except fatal errors"),
    (2, "Normal usage output"),
    (5, "Log each packet"),
    (7, "Debug"),
];

/// Every scalar option with its documented default
pub fn defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("enable_ipv6", Value::Bool(true)),
        ("port", Value::Int(1194)),
        ("protocol", Value::from("udp")),
        ("deviceovpn", Value::from("tun")),
        ("compression", Value::Bool(true)),
        ("duplicate_cn", Value::Bool(false)),
        ("pam_authentication", Value::Bool(false)),
        ("extra_options", Value::from("")),
        ("loglevel", Value::from("Normal usage output")),
        ("vpn_network", Value::from("10.8.0.0")),
        ("vpn_mask", Value::from("255.255.255.0")),
        ("gateway_interface", Value::from("wlan0")),
        ("default_gateway", Value::Bool(true)),
        ("default_route", Value::Bool(true)),
        ("client_to_client", Value::Bool(false)),
        ("dns_server", Value::from("Google")),
        ("dns", Value::from("")),
        ("dns_domains", Value::from("")),
        ("wins", Value::from("")),
        ("public_address", Value::from("")),
    ]
}

/// Whether `key` is a list-valued option
pub fn is_list_key(key: &str) -> bool {
    LIST_KEYS.contains(&key)
}

/// Map a named log level to the daemon's numeric verbosity (unknown names map to 0)
pub fn log_verbosity(name: &str) -> u8 {
    LOG_LEVELS
        .iter()
        .find(|(_, label)| *label == name)
        .map(|(level, _)| *level)
        .unwrap_or(0)
}

/// Whether `name` is one of the recognised log level names
pub fn is_log_level(name: &str) -> bool {
    LOG_LEVELS.iter().any(|(_, label)| *label == name)
}

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP transport
    Tcp,
    /// UDP transport (default)
    #[default]
    Udp,
}

impl Protocol {
    /// All protocols in display order
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    /// Directive spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(format!("Unknown protocol: {}. Use 'tcp' or 'udp'", s)),
        }
    }
}

/// Virtual device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Routed IP tunnel (default)
    #[default]
    Tun,
    /// Bridged ethernet tunnel
    Tap,
}

impl DeviceType {
    /// All device types in display order
    pub const ALL: [DeviceType; 2] = [DeviceType::Tun, DeviceType::Tap];

    /// Directive spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Tun => "tun",
            DeviceType::Tap => "tap",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tun" => Ok(DeviceType::Tun),
            "tap" => Ok(DeviceType::Tap),
            _ => Err(format!("Unknown device: {}. Use 'tun' or 'tap'", s)),
        }
    }
}
