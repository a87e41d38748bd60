//! Request payloads
//!
//! Each command that takes a JSON payload has its own request struct.
//! Unknown fields are rejected, and every field is validated before the
//! request touches the settings store. Boolean fields accept `true`,
//! positive numbers, or the strings `"true"`, `"yes"` and `"1"`. List fields
//! accept an array or a single comma-joined string.

use crate::dns;
use crate::error::{GatewayError, GatewayResult};
use ovpnctl_settings::schema::{self, DeviceType, Protocol};
use ovpnctl_settings::{text_is_true, Settings, LIST_DELIMITER};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use std::net::Ipv4Addr;

const MAX_NAME_LEN: usize = 64;

/// A validated request payload
pub trait Request: DeserializeOwned {
    /// Reject payloads that would produce an unusable configuration
    fn validate(&self) -> GatewayResult<()>;
}

/// Decode and validate a JSON payload
pub fn parse<T: Request>(json: &str) -> GatewayResult<T> {
    let request: T = serde_json::from_str(json)
        .map_err(|e| GatewayError::Validation(format!("Invalid JSON format: {}", e)))?;
    request.validate()?;
    Ok(request)
}

// ─── Lenient field decoding ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagInput {
    Bool(bool),
    Number(f64),
    Text(String),
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(Some(match FlagInput::deserialize(d)? {
        FlagInput::Bool(b) => b,
        FlagInput::Number(n) => n > 0.0,
        FlagInput::Text(s) => text_is_true(&s),
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListInput {
    Many(Vec<String>),
    One(String),
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Some(match ListInput::deserialize(d)? {
        ListInput::Many(items) => items,
        ListInput::One(text) if text.is_empty() => Vec::new(),
        ListInput::One(text) => text.split(LIST_DELIMITER).map(str::to_string).collect(),
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortInput {
    Number(u64),
    Text(String),
}

fn lenient_port<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    let port = match PortInput::deserialize(d)? {
        PortInput::Number(n) => u16::try_from(n).ok(),
        PortInput::Text(s) => s.trim().parse().ok(),
    };
    match port {
        Some(p) if p > 0 => Ok(Some(p)),
        _ => Err(D::Error::custom("port must be between 1 and 65535")),
    }
}

// ─── Validation helpers ──────────────────────────────────────────────────────

fn single_line(field: &str, value: &str) -> GatewayResult<()> {
    if value.contains(['\n', '\r']) {
        return Err(GatewayError::Validation(format!("{} must be a single line", field)));
    }
    Ok(())
}

fn list_items(field: &str, items: &[String]) -> GatewayResult<()> {
    for item in items {
        single_line(field, item)?;
        if item.contains(LIST_DELIMITER) {
            return Err(GatewayError::Validation(format!(
                "{} entries may not contain '{}': {}",
                field, LIST_DELIMITER, item
            )));
        }
    }
    Ok(())
}

fn dotted_quad(field: &str, value: &str) -> GatewayResult<()> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| GatewayError::Validation(format!("{} is not an IPv4 address: {}", field, value)))
}

/// Client names double as certificate common names and file names
pub fn validate_name(name: &str) -> GatewayResult<()> {
    if name.is_empty() {
        return Err(GatewayError::Validation("No certificate name given".to_string()));
    }
    let valid = name.len() <= MAX_NAME_LEN
        && !name.starts_with(['.', '-'])
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        return Err(GatewayError::Validation(format!(
            "Invalid certificate name '{}': use up to {} letters, digits, '-', '_', '.' or '@'",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

// ─── setup ───────────────────────────────────────────────────────────────────

/// Partial settings update; every present field overwrites its setting
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupRequest {
    #[serde(default, deserialize_with = "lenient_flag")]
    enable_ipv6: Option<bool>,
    #[serde(default, deserialize_with = "lenient_port")]
    port: Option<u16>,
    #[serde(default)]
    protocol: Option<Protocol>,
    #[serde(default)]
    deviceovpn: Option<DeviceType>,
    #[serde(default, deserialize_with = "lenient_flag")]
    compression: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    duplicate_cn: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pam_authentication: Option<bool>,
    #[serde(default, deserialize_with = "lenient_list")]
    extra_options: Option<Vec<String>>,
    #[serde(default)]
    loglevel: Option<String>,
    #[serde(default)]
    vpn_network: Option<String>,
    #[serde(default)]
    vpn_mask: Option<String>,
    #[serde(default)]
    gateway_interface: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    default_gateway: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    default_route: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    client_to_client: Option<bool>,
    #[serde(default)]
    dns_server: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    dns: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list")]
    dns_domains: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list")]
    wins: Option<Vec<String>>,
    #[serde(default)]
    public_address: Option<String>,
}

impl Request for SetupRequest {
    fn validate(&self) -> GatewayResult<()> {
        if let Some(level) = &self.loglevel {
            if !schema::is_log_level(level) {
                return Err(GatewayError::Validation(format!("Unknown log level: {}", level)));
            }
        }
        if let Some(profile) = &self.dns_server {
            if !dns::is_profile(profile) {
                return Err(GatewayError::Validation(format!("Unknown DNS server profile: {}", profile)));
            }
        }
        if let Some(network) = &self.vpn_network {
            dotted_quad("vpn_network", network)?;
        }
        if let Some(mask) = &self.vpn_mask {
            dotted_quad("vpn_mask", mask)?;
        }
        for (field, value) in [
            ("gateway_interface", &self.gateway_interface),
            ("public_address", &self.public_address),
        ] {
            if let Some(value) = value {
                single_line(field, value)?;
                if value.contains(char::is_whitespace) {
                    return Err(GatewayError::Validation(format!("{} may not contain spaces", field)));
                }
            }
        }
        for (field, items) in [
            ("extra_options", &self.extra_options),
            ("dns", &self.dns),
            ("dns_domains", &self.dns_domains),
            ("wins", &self.wins),
        ] {
            if let Some(items) = items {
                list_items(field, items)?;
            }
        }
        Ok(())
    }
}

impl SetupRequest {
    /// Write every present field into `settings`; returns the keys touched
    pub fn apply_to(&self, settings: &mut Settings) -> Vec<&'static str> {
        let mut touched = Vec::new();
        let mut put = |key: &'static str, value: Option<ovpnctl_settings::Value>| {
            if let Some(value) = value {
                settings.set(key, value);
                touched.push(key);
            }
        };

        put("enable_ipv6", self.enable_ipv6.map(Into::into));
        put("port", self.port.map(|p| i64::from(p).into()));
        put("protocol", self.protocol.map(|p| p.as_str().into()));
        put("deviceovpn", self.deviceovpn.map(|d| d.as_str().into()));
        put("compression", self.compression.map(Into::into));
        put("duplicate_cn", self.duplicate_cn.map(Into::into));
        put("pam_authentication", self.pam_authentication.map(Into::into));
        put("extra_options", self.extra_options.clone().map(Into::into));
        put("loglevel", self.loglevel.clone().map(Into::into));
        put("vpn_network", self.vpn_network.clone().map(Into::into));
        put("vpn_mask", self.vpn_mask.clone().map(Into::into));
        put("gateway_interface", self.gateway_interface.clone().map(Into::into));
        put("default_gateway", self.default_gateway.map(Into::into));
        put("default_route", self.default_route.map(Into::into));
        put("client_to_client", self.client_to_client.map(Into::into));
        put("dns_server", self.dns_server.clone().map(Into::into));
        put("dns", self.dns.clone().map(Into::into));
        put("dns_domains", self.dns_domains.clone().map(Into::into));
        put("wins", self.wins.clone().map(Into::into));
        put("public_address", self.public_address.clone().map(Into::into));
        touched
    }
}

// ─── add / del / download ────────────────────────────────────────────────────

/// Issue a client identity, or update the users bound to an existing one
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientRequest {
    /// Client name
    pub name: String,
    /// Authorized login accounts; absent means none
    #[serde(default, deserialize_with = "lenient_list")]
    pub users: Option<Vec<String>>,
}

impl ClientRequest {
    /// Authorized users; an absent field is an empty list
    pub fn users(&self) -> Vec<String> {
        self.users.clone().unwrap_or_default()
    }
}

impl Request for ClientRequest {
    fn validate(&self) -> GatewayResult<()> {
        validate_name(&self.name)?;
        if let Some(users) = &self.users {
            list_items("users", users)?;
        }
        Ok(())
    }
}

/// Refer to an existing client identity
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NameRequest {
    /// Client name
    pub name: String,
}

impl Request for NameRequest {
    fn validate(&self) -> GatewayResult<()> {
        validate_name(&self.name)
    }
}
