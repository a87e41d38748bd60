//! Gateway orchestration
//!
//! One method per command. Each opens the settings store (taking its lock),
//! performs one logical operation and lets the store drop on return.

use crate::compiler::{self, GatewayOptions, ServerContext};
use crate::dns;
use crate::error::GatewayResult;
use crate::firewall::{self, FirewallTools};
use crate::layout::Layout;
use crate::ledger::{CertificateLedger, Issued};
use crate::netfacts::NetworkFactsProvider;
use crate::pki::PkiEngine;
use crate::requests::{ClientRequest, NameRequest, SetupRequest};
use crate::service::{self, ServiceAction, ServiceController};
use crate::users;
use ovpnctl_settings::schema::{self, DeviceType, Protocol, LOG_LEVELS};
use ovpnctl_settings::{write_atomic, Client, Settings, SettingsStore, ToolsConfig, Value};
use serde::Serialize;
use serde_json::{Map, Number};
use std::path::{Path, PathBuf};

const PAM_PLUGIN_FILE: &str = "openvpn-plugin-auth-pam.so";

/// Choices offered for the enumerated settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionCatalog {
    /// Transports
    pub protocol: Vec<&'static str>,
    /// Device types
    pub device: Vec<&'static str>,
    /// Log level names
    pub loglevel: Vec<&'static str>,
    /// DNS profile names
    #[serde(rename = "DNS_server")]
    pub dns_server: Vec<&'static str>,
    /// Network interfaces
    pub gateway: Vec<String>,
    /// Login accounts
    pub users: Vec<String>,
}

/// A gateway installation and the external tools that drive it
pub struct Gateway<P, S, N> {
    layout: Layout,
    tools: ToolsConfig,
    ledger: CertificateLedger<P>,
    services: S,
    network: N,
    firewall: FirewallTools,
}

impl<P: PkiEngine, S: ServiceController, N: NetworkFactsProvider> Gateway<P, S, N> {
    /// Assemble a gateway over `layout`
    pub fn new(layout: Layout, tools: ToolsConfig, pki: P, services: S, network: N) -> Self {
        let ledger = CertificateLedger::new(pki, layout.pki_dir.clone(), layout.pki_lock());
        Self {
            layout,
            tools,
            ledger,
            services,
            network,
            firewall: FirewallTools::default(),
        }
    }

    /// Use these firewall tool locations in the generated unit
    pub fn with_firewall_tools(mut self, firewall: FirewallTools) -> Self {
        self.firewall = firewall;
        self
    }

    /// Filesystem layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn open_store(&self) -> GatewayResult<SettingsStore> {
        Ok(SettingsStore::open(&self.layout.settings)?)
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Every client with its authorized users
    pub fn list(&self) -> GatewayResult<Vec<Client>> {
        let store = self.open_store()?;
        Ok(CertificateLedger::<P>::list(store.settings()))
    }

    /// Every setting except the client registry; list settings as arrays
    pub fn get(&self) -> GatewayResult<Map<String, serde_json::Value>> {
        let store = self.open_store()?;
        Ok(settings_to_json(store.settings()))
    }

    /// Choices for the enumerated settings plus live host facts
    pub fn getopt(&self) -> GatewayResult<OptionCatalog> {
        Ok(OptionCatalog {
            protocol: Protocol::ALL.iter().map(Protocol::as_str).collect(),
            device: DeviceType::ALL.iter().map(DeviceType::as_str).collect(),
            loglevel: LOG_LEVELS.iter().map(|(_, name)| *name).collect(),
            dns_server: dns::profile_names(),
            gateway: self.network.interfaces(),
            users: users::login_users(&self.layout.passwd, &self.layout.login_defs),
        })
    }

    // ─── Settings ────────────────────────────────────────────────────────

    /// Apply a partial settings update, regenerate every derived file and
    /// restart the daemon. Initializes the authority first when missing.
    pub fn setup(&self, request: &SetupRequest) -> GatewayResult<bool> {
        let mut store = self.open_store()?;
        let server_name = self.layout.server_name();
        if !self.ledger.exists(&server_name) {
            tracing::info!("No certificate authority yet, creating one");
            self.ledger.initialize_identity(&mut store, &server_name)?;
        }

        let touched = request.apply_to(store.settings_mut());
        store.save()?;
        tracing::info!("Updated settings: {}", touched.join(", "));

        self.apply(store.settings())?;

        service::ctl(&self.services, ServiceAction::Enable)?;
        service::ctl(&self.services, ServiceAction::Restart)
    }

    /// Regenerate forwarding switches, the firewall unit and the server
    /// configuration from `settings`
    pub fn apply(&self, settings: &Settings) -> GatewayResult<()> {
        let opts = GatewayOptions::from_settings(settings);
        let facts = self.network.facts(&opts.gateway_interface, opts.enable_ipv6);
        if facts.ipv4.is_empty() {
            tracing::warn!("No IPv4 address on {}", opts.gateway_interface);
        }
        let ipv6 = compiler::ipv6_active(&opts, &facts);

        write_file(&self.layout.sysctl_conf, &firewall::render_sysctl(ipv6))?;
        let ipv6_switch = ipv6.then_some(self.layout.ipv6_forward.as_path());
        if let Err(e) = firewall::enable_forwarding(&self.layout.ipv4_forward, ipv6_switch) {
            tracing::warn!("Could not enable forwarding now: {}", e);
        }

        let unit = firewall::render_unit(&opts, &facts, &self.firewall);
        write_file(&self.layout.firewall_unit, &compiler::render_server(&unit))?;

        let profile_dns = dns::resolve_profile(
            &opts.dns_server,
            &self.layout.resolv_conf,
            &self.layout.resolv_conf_fallback,
        );
        let pam_plugin = self.pam_plugin();
        let server_name = self.layout.server_name();
        let ctx = ServerContext {
            pki_dir: &self.layout.pki_dir,
            server_name: &server_name,
            pam_plugin: &pam_plugin,
            status_log: &self.tools.daemon.status_log,
            daemon_log: &self.tools.daemon.log,
            profile_dns: &profile_dns,
        };
        let conf = compiler::compile_server(&opts, &facts, &ctx);
        write_file(&self.layout.server_conf, &compiler::render_server(&conf))?;

        tracing::info!("Regenerated {}", self.layout.server_conf.display());
        Ok(())
    }

    /// Configured PAM plugin, else the first one found under the library tree
    fn pam_plugin(&self) -> PathBuf {
        let configured = PathBuf::from(&self.tools.daemon.pam_plugin);
        if configured.is_file() {
            return configured;
        }
        find_file(&self.layout.lib_dir, PAM_PLUGIN_FILE).unwrap_or(configured)
    }

    // ─── Clients ─────────────────────────────────────────────────────────

    /// Issue a client identity or update its users
    pub fn add(&self, request: &ClientRequest) -> GatewayResult<Issued> {
        let mut store = self.open_store()?;
        self.ledger.require_ready(&self.layout.server_name())?;
        self.ledger.issue(&mut store, &request.name, &request.users())
    }

    /// Revoke a client identity
    pub fn del(&self, request: &NameRequest) -> GatewayResult<Client> {
        let mut store = self.open_store()?;
        self.ledger.require_ready(&self.layout.server_name())?;
        self.ledger.revoke(&mut store, &request.name)
    }

    /// Write the client bundle; returns the archive path
    pub fn download(&self, request: &NameRequest) -> GatewayResult<PathBuf> {
        let store = self.open_store()?;
        self.ledger.require_ready(&self.layout.server_name())?;
        std::fs::create_dir_all(&self.layout.tmp_dir)?;
        self.ledger.bundle(store.settings(), &request.name, &self.layout.tmp_dir)
    }

    /// Create a new authority and server identity, forgetting all clients
    pub fn setup_cert(&self) -> GatewayResult<()> {
        let mut store = self.open_store()?;
        self.ledger.initialize_identity(&mut store, &self.layout.server_name())
    }

    // ─── Service ─────────────────────────────────────────────────────────

    /// Drive the daemon units
    pub fn ctl(&self, action: ServiceAction) -> GatewayResult<bool> {
        service::ctl(&self.services, action)
    }
}

/// JSON view of the scalar settings
pub fn settings_to_json(settings: &Settings) -> Map<String, serde_json::Value> {
    settings
        .options()
        .map(|(key, value)| {
            let json = if schema::is_list_key(key) {
                serde_json::Value::from(value.split_list())
            } else {
                value_to_json(value)
            };
            (key.to_string(), json)
        })
        .collect()
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::from(items.clone()),
    }
}

fn write_file(path: &Path, content: &str) -> GatewayResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, content)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Depth-first search for a file called `name` below `dir`
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<_> = std::fs::read_dir(dir).ok()?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() && entry.file_name() == name {
            return Some(path);
        }
        if file_type.is_dir() {
            if let Some(found) = find_file(&path, name) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_to_json() {
        let mut settings = Settings::with_defaults();
        settings.set("dns", "1.1.1.1,9.9.9.9");
        let json = settings_to_json(&settings);

        assert_eq!(json["port"], serde_json::json!(1194));
        assert_eq!(json["compression"], serde_json::json!(true));
        assert_eq!(json["dns"], serde_json::json!(["1.1.1.1", "9.9.9.9"]));
        assert_eq!(json["wins"], serde_json::json!([]));
        assert_eq!(json["protocol"], serde_json::json!("udp"));
        assert!(!json.contains_key("clients"));
    }

    #[test]
    fn test_find_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x86_64-linux-gnu").join("openvpn").join("plugins");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join(PAM_PLUGIN_FILE), b"").unwrap();

        assert_eq!(find_file(dir.path(), PAM_PLUGIN_FILE), Some(nested.join(PAM_PLUGIN_FILE)));
        assert_eq!(find_file(dir.path(), "missing.so"), None);
    }
}
