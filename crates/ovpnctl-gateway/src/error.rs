//! Gateway error types

use ovpnctl_settings::StoreError;
use std::io;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while managing the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Settings store failure (always fatal)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unacceptable request payload
    #[error("{0}")]
    Validation(String),

    /// No client with this name in the ledger
    #[error("Invalid name, certificate doesn't exist: {0}")]
    NotFound(String),

    /// Certificate authority or server identity missing
    #[error("Certificate doesn't exist, setup certificates first!")]
    NotReady,

    /// A required certificate authority step failed
    #[error("Error executing {step} command: {detail}")]
    Pki {
        /// Step that failed (e.g. `build-ca`)
        step: String,
        /// Tool diagnostics
        detail: String,
    },

    /// External command could not be run or returned an unexpected status
    #[error("External command `{command}` failed: {detail}")]
    Command {
        /// Program and arguments
        command: String,
        /// Exit status and error output
        detail: String,
    },

    /// Service manager unavailable or misbehaving
    #[error("{0}")]
    Service(String),

    /// Client bundle archive could not be written
    #[error("Failed to write client bundle: {0}")]
    Archive(String),
}

impl GatewayError {
    /// Whether this error is the caller's fault (bad input) rather than a
    /// fault of the installation or of an external tool
    pub fn is_usage(&self) -> bool {
        matches!(self, GatewayError::Validation(_) | GatewayError::NotFound(_))
    }
}

impl From<zip::result::ZipError> for GatewayError {
    fn from(e: zip::result::ZipError) -> Self {
        GatewayError::Archive(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_classification() {
        assert!(GatewayError::Validation("bad".into()).is_usage());
        assert!(GatewayError::NotFound("laptop".into()).is_usage());
        assert!(!GatewayError::NotReady.is_usage());
        assert!(!GatewayError::Pki {
            step: "build-ca".into(),
            detail: "exit 1".into()
        }
        .is_usage());
    }
}
