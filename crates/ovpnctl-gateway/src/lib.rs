//! ovpnctl Gateway: certificate lifecycle and daemon configuration
//!
//! This crate turns the persisted gateway settings into a running OpenVPN
//! service:
//!
//! - **Certificate ledger**: issues and revokes named client identities
//!   through an external easy-rsa authority, keeping the `clients` registry
//!   and the key directory in step.
//! - **Config compiler**: pure, deterministic rendering of server and
//!   client directives from settings plus interface addresses.
//! - **Host plumbing**: forwarding switches, a firewall service unit, and
//!   the systemd units of the daemon.
//!
//! The external collaborators sit behind traits ([`PkiEngine`],
//! [`ServiceController`], [`NetworkFactsProvider`]) so the orchestration
//! can be exercised without root, easy-rsa or systemd.
//!
//! # Example
//!
//! ```no_run
//! use ovpnctl_gateway::{EasyRsa, Gateway, IpCommand, Layout, Systemd};
//! use ovpnctl_settings::ToolsConfig;
//! use std::time::Duration;
//!
//! let layout = Layout::system();
//! let tools = ToolsConfig::load_system()?;
//! let gateway = Gateway::new(
//!     layout.clone(),
//!     tools.clone(),
//!     EasyRsa::new(&tools.pki.easyrsa, &layout.pki_dir),
//!     Systemd::locate(Duration::from_secs(tools.service.timeout_secs)),
//!     IpCommand::new(&layout.net_class),
//! );
//! for client in gateway.list()? {
//!     println!("{}", client.name);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub mod bundle;
pub mod compiler;
pub mod dns;
pub mod error;
pub mod firewall;
pub mod gateway;
pub mod layout;
pub mod ledger;
pub mod netfacts;
pub mod pki;
pub mod requests;
pub mod service;
pub mod shell;
pub mod users;

// Re-exports
pub use compiler::{compile_client, compile_server, subnet, Credentials, GatewayOptions, ServerContext};
pub use error::{GatewayError, GatewayResult};
pub use firewall::FirewallTools;
pub use gateway::{Gateway, OptionCatalog};
pub use layout::Layout;
pub use ledger::{CertificateLedger, Issued};
pub use netfacts::{IpCommand, NetworkFacts, NetworkFactsProvider};
pub use pki::{EasyRsa, PkiEngine, PkiStep};
pub use requests::{ClientRequest, NameRequest, SetupRequest};
pub use service::{ServiceAction, ServiceController, Systemd, UNITS};
pub use shell::{CommandOutput, Shell};
