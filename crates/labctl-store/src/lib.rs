//! Persisted preferences for labctl.
//!
//! A single small `key=value` file in the compose context records the X11
//! forwarding decision and the temporary directory holding the synthesized
//! X authority file. Absence of the file is a valid initial state. Writes go
//! through a temp file and `rename()` so readers never see a partial file.

pub mod config;

pub use config::{PersistedConfig, X11Preference};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Replace `path` with `contents` via a sibling temp file and `rename()`.
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(&dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid value for '{key}' in {path}: '{value}'")]
    InvalidValue {
        path: String,
        key: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display() {
        let e = StoreError::InvalidValue {
            path: "/ctx/.container.cfg".to_owned(),
            key: "x11_forwarding_enabled".to_owned(),
            value: "maybe".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("x11_forwarding_enabled"));
        assert!(msg.contains("maybe"));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.yaml");
        write_atomic(&path, b"services: {}\n").unwrap();
        write_atomic(&path, b"volumes: {}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "volumes: {}\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_atomic_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/merged.yaml");
        write_atomic(&path, b"x: 1\n").unwrap();
        assert!(path.is_file());
    }
}
