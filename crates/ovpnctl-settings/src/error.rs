//! Settings store error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for settings store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while loading or persisting settings
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The persisted document exists but cannot be trusted
    #[error("Error parsing settings file {path}: {detail}. Check the XML file syntax for errors")]
    Malformed {
        /// Offending file
        path: PathBuf,
        /// What was wrong with it
        detail: String,
    },

    /// No writable location for the settings file
    #[error("No valid writable settings location: {0}. Please run as super user")]
    NotWritable(PathBuf),

    /// Advisory lock could not be taken
    #[error("Failed to lock {path}: {source}")]
    Lock {
        /// Lock file
        path: PathBuf,
        /// Underlying OS error
        source: io::Error,
    },

    /// XML serialization failed
    #[error("XML error: {0}")]
    Xml(String),

    /// Tool configuration file is not valid TOML
    #[error("Failed to parse tool configuration: {0}")]
    ToolsConfig(#[from] toml::de::Error),
}
