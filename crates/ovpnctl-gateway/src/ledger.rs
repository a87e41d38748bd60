//! Certificate ledger
//!
//! The ledger is the `clients` registry of the settings document together
//! with the key material the certificate authority keeps on disk. The two
//! halves have no shared transaction, so the operations here order their
//! side effects carefully:
//!
//! - **issue** appends the ledger entry only after the authority has built
//!   the key pair, so a failed build never leaves a dangling entry.
//! - **revoke** drops the entry and then runs its three cleanups (revoke,
//!   file removal, CRL refresh) independently; each is best-effort so that
//!   re-running a half-finished revoke always completes it.
//! - **initialize_identity** wipes everything and starts a new authority.
//!
//! Every mutation of the PKI directory holds the PKI lock.

use crate::bundle::{archive_path, ClientBundle};
use crate::compiler::{compile_client, render_client, Credentials, GatewayOptions};
use crate::error::{GatewayError, GatewayResult};
use crate::pki::{PkiEngine, PkiStep};
use ovpnctl_settings::{Client, FileLock, Settings, SettingsStore, LIST_DELIMITER};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Length of a minted client id
pub const CLIENT_ID_LEN: usize = 16;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Outcome of an issue request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issued {
    /// A new identity was built under this id
    Created(String),
    /// The identity existed; only its users were replaced
    Updated(String),
}

/// Client identities backed by a certificate authority
pub struct CertificateLedger<P> {
    pki: P,
    pki_dir: PathBuf,
    lock_path: PathBuf,
}

impl<P: PkiEngine> CertificateLedger<P> {
    /// Ledger over the authority `pki` working in `pki_dir`, serialized by `lock_path`
    pub fn new(pki: P, pki_dir: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            pki,
            pki_dir: pki_dir.into(),
            lock_path: lock_path.into(),
        }
    }

    /// Certificate authority working directory
    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    /// Whether the authority or the server identity exists on disk
    pub fn exists(&self, server_name: &str) -> bool {
        self.private_key("ca").is_file() || self.private_key(server_name).is_file()
    }

    /// Fail with [`GatewayError::NotReady`] unless [`exists`](Self::exists)
    pub fn require_ready(&self, server_name: &str) -> GatewayResult<()> {
        if self.exists(server_name) {
            Ok(())
        } else {
            Err(GatewayError::NotReady)
        }
    }

    /// Issue identity `name`, or replace the users of an existing one
    pub fn issue(&self, store: &mut SettingsStore, name: &str, users: &[String]) -> GatewayResult<Issued> {
        let delimiter = LIST_DELIMITER.to_string();
        let joined = users.join(delimiter.as_str());

        if let Some(client) = store.settings_mut().client_by_name_mut(name) {
            client.users = joined;
            let id = client.id.clone();
            store.save()?;
            tracing::info!("Updated users of client {}", name);
            return Ok(Issued::Updated(id));
        }

        let _lock = FileLock::acquire(&self.lock_path)?;
        self.pki.execute(&PkiStep::BuildClient(name.to_string()))?;

        let id = mint_id(store.settings());
        store.settings_mut().insert_client(Client {
            id: id.clone(),
            name: name.to_string(),
            users: joined,
        });
        store.save()?;
        tracing::info!("Issued client {} ({})", name, id);
        Ok(Issued::Created(id))
    }

    /// Revoke identity `name`; its ledger entry is removed even when the
    /// authority reports it was already revoked
    pub fn revoke(&self, store: &mut SettingsStore, name: &str) -> GatewayResult<Client> {
        let client = store
            .settings_mut()
            .remove_client_by_name(name)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))?;

        let _lock = FileLock::acquire(&self.lock_path)?;

        if let Err(e) = self.pki.execute(&PkiStep::Revoke(name.to_string())) {
            tracing::warn!("Ignoring revoke failure for {}: {}", name, e);
        }
        if let Err(e) = self.pki.execute(&PkiStep::GenCrl) {
            tracing::warn!("Ignoring CRL refresh failure: {}", e);
        }
        for path in self.key_files(name) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
            }
        }

        store.save()?;
        tracing::info!("Revoked client {} ({})", name, client.id);
        Ok(client)
    }

    /// Assemble the downloadable bundle for `name` under `out_dir`
    pub fn bundle(&self, settings: &Settings, name: &str, out_dir: &Path) -> GatewayResult<PathBuf> {
        if settings.client_by_name(name).is_none() {
            return Err(GatewayError::NotFound(name.to_string()));
        }

        let read = |path: PathBuf| {
            std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::Archive(format!("cannot read {}: {}", path.display(), e))
            })
        };
        let ca = read(self.pki_dir.join("ca.crt"))?;
        let cert = read(self.certificate(name))?;
        let key = read(self.private_key(name))?;

        let opts = GatewayOptions::from_settings(settings);
        let files = render_client(&compile_client(name, &opts, Credentials::Files));
        let inline = render_client(&compile_client(
            name,
            &opts,
            Credentials::Inline {
                ca: &ca,
                cert: &cert,
                key: &key,
            },
        ));

        let mut bundle = ClientBundle::new();
        bundle
            .add(format!("{}-ca.crt", name), ca.as_str())
            .add(format!("{}-client.crt", name), cert.as_str())
            .add(format!("{}-client.key", name), key.as_str())
            .add(format!("{}-client.conf", name), files)
            .add(format!("{}-client.ovpn", name), inline);
        bundle.write(&archive_path(out_dir, name))
    }

    /// Start over with a new authority and server identity. Every existing
    /// client identity is forgotten.
    pub fn initialize_identity(&self, store: &mut SettingsStore, server_name: &str) -> GatewayResult<()> {
        let _lock = FileLock::acquire(&self.lock_path)?;

        if let Some(parent) = self.pki_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.pki.execute(&PkiStep::InitPki)?;

        let orphaned = store.settings().clients().len();
        store.settings_mut().clear_clients();
        store.save()?;
        if orphaned > 0 {
            tracing::warn!("Forgot {} client identities of the previous authority", orphaned);
        }

        self.pki.execute(&PkiStep::BuildCa)?;
        self.pki.execute(&PkiStep::BuildServer(server_name.to_string()))?;
        // Fails harmlessly while nothing has been revoked yet
        if let Err(e) = self.pki.execute(&PkiStep::GenCrl) {
            tracing::debug!("Initial CRL not generated: {}", e);
        }
        self.pki.execute(&PkiStep::GenDh)?;

        tracing::info!("Certificate authority and server identity {} created", server_name);
        Ok(())
    }

    /// All clients
    pub fn list(settings: &Settings) -> Vec<Client> {
        settings.clients().values().cloned().collect()
    }

    fn private_key(&self, name: &str) -> PathBuf {
        self.pki_dir.join("private").join(format!("{}.key", name))
    }

    fn certificate(&self, name: &str) -> PathBuf {
        self.pki_dir.join("issued").join(format!("{}.crt", name))
    }

    fn key_files(&self, name: &str) -> [PathBuf; 3] {
        [
            self.private_key(name),
            self.certificate(name),
            self.pki_dir.join("reqs").join(format!("{}.req", name)),
        ]
    }
}

/// Fresh random id not yet used in `settings`
fn mint_id(settings: &Settings) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id: String = (0..CLIENT_ID_LEN)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        if !settings.has_client_id(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_id_shape() {
        let settings = Settings::with_defaults();
        let id = mint_id(&settings);
        assert_eq!(id.len(), CLIENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
        assert_ne!(id, mint_id(&settings));
    }
}
