//! Advisory file locks
//!
//! Two invocations of the tool may run at the same time. Every
//! load-mutate-save cycle on the settings file, and every mutation of the
//! PKI directory, holds an exclusive `flock(2)` on a sidecar lock file for
//! its whole duration. The lock is released when the guard is dropped (or
//! when the process exits).

use crate::error::{StoreError, StoreResult};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held until drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock on `path` is acquired, creating the file if needed
    pub fn acquire(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Lock {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        // Unprivileged readers can still lock an existing file opened read-only
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .or_else(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied if path.exists() => File::open(path),
                _ => Err(e),
            })
            .map_err(|source| StoreError::Lock {
                path: path.to_path_buf(),
                source,
            })?;

        lock_exclusive(&file).map_err(|source| StoreError::Lock {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Acquired lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        unlock(&self.file);
        tracing::debug!("Released lock {}", self.path.display());
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.lock");

        let first = FileLock::acquire(&path).unwrap();
        assert!(first.path().exists());
        drop(first);

        let second = FileLock::acquire(&path).unwrap();
        assert_eq!(second.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_excludes_second_holder() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pki.lock");
        let first = FileLock::acquire(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let path = path.clone();
            thread::spawn(move || {
                let second = FileLock::acquire(&path).unwrap();
                tx.send(()).unwrap();
                drop(second);
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        drop(first);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_lock_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pki.lock");
        let _lock = FileLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
