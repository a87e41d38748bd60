//! ovpnctl Settings: persistent gateway configuration
//!
//! This crate owns the single settings document of an OpenVPN gateway
//! installation: a flat mapping of typed options plus the registry of
//! issued client identities, stored as XML at a fixed system path.
//!
//! # Guarantees
//!
//! - **Complete schema**: every default key exists after any load; missing
//!   keys are backfilled and written back immediately.
//! - **Faithful round trip**: saving a loaded document reproduces it,
//!   including the operator-facing header comment.
//! - **Fail closed**: a malformed document is an error, never partially used.
//! - **Serialized writers**: a load-mutate-save cycle holds an exclusive
//!   advisory lock on the document.
//!
//! # Example
//!
//! ```no_run
//! use ovpnctl_settings::SettingsStore;
//!
//! let mut store = SettingsStore::open_system()?;
//! store.set("port", 443i64);
//! store.save()?;
//! # Ok::<(), ovpnctl_settings::StoreError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod lock;
pub mod schema;
pub mod settings;
pub mod store;
pub mod value;
pub mod xml;

// Re-exports
pub use config::{ToolsConfig, TOOLS_CONFIG_PATH};
pub use error::{StoreError, StoreResult};
pub use lock::FileLock;
pub use schema::{DeviceType, Protocol, LIST_KEYS, LOG_LEVELS};
pub use settings::{Client, Settings};
pub use store::{write_atomic, SettingsStore, SETTINGS_PATH};
pub use value::{text_is_true, Value, LIST_DELIMITER};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
