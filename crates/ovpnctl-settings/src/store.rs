//! Durable settings store
//!
//! The store is opened once per invocation, mutated in memory and either
//! saved or dropped. Opening takes the settings lock and keeps it until the
//! store is dropped, so a whole load-mutate-save cycle is serialized
//! against other invocations.

use crate::error::{StoreError, StoreResult};
use crate::lock::FileLock;
use crate::settings::Settings;
use crate::value::Value;
use crate::xml;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fixed system location of the settings document
pub const SETTINGS_PATH: &str = "/etc/openvpn.xml";

/// Settings document bound to its on-disk location
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    _lock: FileLock,
}

impl SettingsStore {
    /// Open the store at `path`, creating it with the default schema when
    /// absent and backfilling any keys missing from an older document.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let lock = FileLock::acquire(&sidecar(&path, "lock"))?;
        let mut store = Self {
            path,
            settings: Settings::new(),
            _lock: lock,
        };
        store.load()?;
        Ok(store)
    }

    /// Open the store at the fixed system location
    pub fn open_system() -> StoreResult<Self> {
        Self::open(SETTINGS_PATH)
    }

    /// (Re)read the document from disk
    pub fn load(&mut self) -> StoreResult<()> {
        if !self.path.exists() {
            tracing::info!("Creating settings file {}", self.path.display());
            self.settings = Settings::with_defaults();
            return self.save();
        }

        let content = fs::read_to_string(&self.path)?;
        let doc = xml::parse(&content).map_err(|detail| StoreError::Malformed {
            path: self.path.clone(),
            detail,
        })?;
        self.settings = doc.settings;

        let added = self.settings.backfill_defaults();
        if !added.is_empty() || !doc.has_registry {
            tracing::info!(
                "Backfilled {} missing settings in {}",
                added.len() + usize::from(!doc.has_registry),
                self.path.display()
            );
            self.save()?;
        }
        Ok(())
    }

    /// Write the whole document. The new content goes to a sibling file that
    /// is renamed over the old one, so readers never see a partial document.
    pub fn save(&self) -> StoreResult<()> {
        let content = xml::render(&self.settings).map_err(StoreError::Xml)?;
        write_atomic(&self.path, &content).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => StoreError::NotWritable(self.path.clone()),
            _ => StoreError::Io(e),
        })?;
        tracing::debug!("Settings saved to {}", self.path.display());
        Ok(())
    }

    /// Location of the document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access to the current settings
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Typed value of one option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Set one option in memory (call [`save`](Self::save) to persist)
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.settings.set(key, value);
    }
}

/// Write `content` to `path` through a temporary sibling and a rename
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = sidecar(path, "tmp");
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        e
    })
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
