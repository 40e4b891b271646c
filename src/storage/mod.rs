pub mod client_store;
pub mod history;
pub mod settings_store;

pub use client_store::ClientStore;
pub use history::HistoryStore;
pub use settings_store::SettingsStore;

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Per-user data layout under one root directory
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub settings_file: PathBuf,
    pub clients_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub history_db: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            settings_file: root.join("settings.json"),
            clients_dir: root.join("clients"),
            exports_dir: root.join("exports"),
            history_db: root.join("history.db"),
            root,
        }
    }

    /// `~/.req2test`, or `./.req2test` when no home directory is known
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".req2test")
    }

    /// Creates the root, client and export directories
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.root, &self.clients_dir, &self.exports_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::persistence(&format!("cannot create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

/// Writes `bytes` to `dir/name` through a temp file in the same directory.
///
/// The target only appears once the data is fully written. With
/// `overwrite = false` an existing target is left untouched and the call fails.
pub fn write_atomic(dir: &Path, name: &str, bytes: &[u8], overwrite: bool) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(name);

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    if overwrite {
        temp.persist(&target).map_err(|e| e.error)?;
    } else {
        temp.persist_noclobber(&target).map_err(|e| e.error)?;
    }

    debug!("Wrote {} bytes to {}", bytes.len(), target.display());
    Ok(target)
}

/// `write_atomic` on the blocking pool
pub(crate) async fn write_atomic_async(
    dir: PathBuf,
    name: String,
    bytes: Vec<u8>,
    overwrite: bool,
) -> std::io::Result<PathBuf> {
    tokio::task::spawn_blocking(move || write_atomic(&dir, &name, &bytes, overwrite))
        .await
        .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new("/data");
        assert_eq!(paths.settings_file, PathBuf::from("/data/settings.json"));
        assert_eq!(paths.clients_dir, PathBuf::from("/data/clients"));
        assert_eq!(paths.history_db, PathBuf::from("/data/history.db"));
    }

    #[test]
    fn test_write_atomic_no_clobber() {
        let dir = TempDir::new().unwrap();
        let path = write_atomic(dir.path(), "out.txt", b"first", false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        assert!(write_atomic(dir.path(), "out.txt", b"second", false).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        write_atomic(dir.path(), "out.txt", b"third", true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"third");

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_ensure_creates_directories() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().join("nested"));
        paths.ensure().await.unwrap();
        assert!(paths.clients_dir.is_dir());
        assert!(paths.exports_dir.is_dir());
    }
}
