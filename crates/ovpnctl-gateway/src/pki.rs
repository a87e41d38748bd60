//! Certificate authority adapter
//!
//! The gateway never touches key material itself: every key pair, signature,
//! revocation and CRL comes from an external easy-rsa installation driven
//! in batch mode. [`PkiEngine`] is the seam; [`EasyRsa`] is the real thing.

use crate::error::{GatewayError, GatewayResult};
use crate::shell::{checked, Shell};
use std::fmt;
use std::path::{Path, PathBuf};

/// One certificate authority operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PkiStep {
    /// Wipe and recreate the PKI directory
    InitPki,
    /// Build the certificate authority
    BuildCa,
    /// Build and sign the server identity
    BuildServer(String),
    /// Regenerate the certificate revocation list
    GenCrl,
    /// Generate Diffie-Hellman parameters
    GenDh,
    /// Build and sign a client identity
    BuildClient(String),
    /// Revoke a client identity
    Revoke(String),
}

impl PkiStep {
    /// Tool arguments for this step
    pub fn args(&self) -> Vec<String> {
        match self {
            PkiStep::InitPki => owned(&["init-pki"]),
            PkiStep::BuildCa => owned(&["build-ca", "nopass"]),
            PkiStep::BuildServer(name) => owned(&["build-server-full", name.as_str(), "nopass"]),
            PkiStep::GenCrl => owned(&["gen-crl"]),
            PkiStep::GenDh => owned(&["gen-dh"]),
            PkiStep::BuildClient(name) => owned(&["build-client-full", name.as_str(), "nopass"]),
            PkiStep::Revoke(name) => owned(&["revoke", name.as_str()]),
        }
    }
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl fmt::Display for PkiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PkiStep::InitPki => "init-pki",
            PkiStep::BuildCa => "build-ca",
            PkiStep::BuildServer(_) => "build-server-full",
            PkiStep::GenCrl => "gen-crl",
            PkiStep::GenDh => "gen-dh",
            PkiStep::BuildClient(_) => "build-client-full",
            PkiStep::Revoke(_) => "revoke",
        };
        f.write_str(name)
    }
}

/// External certificate authority
pub trait PkiEngine {
    /// Run one step; any failure is reported as [`GatewayError::Pki`]
    fn execute(&self, step: &PkiStep) -> GatewayResult<()>;
}

impl<T: PkiEngine + ?Sized> PkiEngine for &T {
    fn execute(&self, step: &PkiStep) -> GatewayResult<()> {
        (**self).execute(step)
    }
}

/// easy-rsa driven as a subprocess
#[derive(Debug, Clone)]
pub struct EasyRsa {
    program: PathBuf,
    pki_dir: PathBuf,
    shell: Shell,
}

impl EasyRsa {
    /// Drive the easy-rsa executable at `program` against `pki_dir`
    pub fn new(program: impl Into<PathBuf>, pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            pki_dir: pki_dir.into(),
            shell: Shell::new(),
        }
    }

    /// Path of the executable
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl PkiEngine for EasyRsa {
    fn execute(&self, step: &PkiStep) -> GatewayResult<()> {
        if !self.program.is_file() {
            return Err(GatewayError::Pki {
                step: step.to_string(),
                detail: format!("easy-rsa not found at {}", self.program.display()),
            });
        }

        let mut args = vec![
            "--batch".to_string(),
            format!("--pki-dir={}", self.pki_dir.display()),
        ];
        args.extend(step.args());

        checked(&self.shell, self.program.as_os_str(), &args).map_err(|e| GatewayError::Pki {
            step: step.to_string(),
            detail: match e {
                GatewayError::Command { detail, .. } => detail,
                other => other.to_string(),
            },
        })?;
        tracing::debug!("easy-rsa {} completed", step);
        Ok(())
    }
}
