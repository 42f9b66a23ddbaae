// ABOUTME: JSON persistence for the promotion ledger.
// ABOUTME: Writes go through a temp file in the same directory and an atomic rename.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::state_lock::StateFileLock;
use crate::types::AppName;

use super::{Ledger, StoreError};

/// Loads and saves one application's ledger at `<state_dir>/<application>.json`.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    application: AppName,
}

impl LedgerStore {
    pub fn new(state_dir: &Path, application: &AppName) -> Self {
        Self {
            path: state_dir.join(format!("{application}.json")),
            application: application.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<Ledger, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Ledger::new(self.application.clone()));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, change and save the ledger under its cross-process lock, so
    /// writers for other environments never drop each other's changes.
    /// Nothing is saved when `change` fails.
    pub fn update<T, E>(&self, change: impl FnOnce(&mut Ledger) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _lock = StateFileLock::acquire(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut ledger = self.load()?;
        let value = change(&mut ledger)?;
        self.save(&ledger)?;
        Ok(value)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(ledger).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        atomic_write(&self.path, &data).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Write `data` to `path` via a temp file in the same directory.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
