//! Downloadable client bundle

use crate::error::GatewayResult;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Everything a client needs, as named archive members
#[derive(Debug, Clone, Default)]
pub struct ClientBundle {
    members: Vec<(String, String)>,
}

impl ClientBundle {
    /// Empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.members.push((name.into(), content.into()));
        self
    }

    /// Member names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }

    /// Write the archive to `path`, replacing any previous one.
    ///
    /// The archive carries the client private key, so the file is created
    /// fresh with mode 0600 and a symlink at `path` is never followed.
    pub fn write(&self, path: &Path) -> GatewayResult<PathBuf> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let file = create_private(path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o600);

        for (name, content) in &self.members {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish()?;

        tracing::info!("Client bundle written to {}", path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Archive location for client `name` under `dir`
pub fn archive_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}-client.zip", name))
}
