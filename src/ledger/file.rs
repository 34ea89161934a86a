//! Persistence adapter for the ledger file
//!
//! The durable representation is one JSON object keyed by user id, kept
//! hand-editable on purpose: backup scripts and out-of-band sync tooling
//! read and write the same file. Writes go to a temporary sibling and are
//! renamed into place, so no reader can observe a half-written ledger.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;

use crate::error::{Error, Result};
use crate::ledger::account::{Account, UserId};

/// Reads and writes the on-disk ledger representation.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full account map.
    ///
    /// A missing file is `Ok(None)`: the caller decides whether that means
    /// "first run, start empty" or something worse. Unparsable content is
    /// always `CorruptFile`; the adapter never guesses.
    pub async fn load(&self) -> Result<Option<HashMap<UserId, Account>>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let accounts = serde_json::from_slice(&data)
            .map_err(|e| Error::CorruptFile(format!("{:?}: {}", self.path, e)))?;
        Ok(Some(accounts))
    }

    /// Atomically replace the ledger file with a full snapshot.
    ///
    /// Returns the new file's modification time so the caller can record it
    /// as the sync marker and not treat its own write as an external change.
    pub async fn save(&self, snapshot: &HashMap<UserId, Account>) -> Result<SystemTime> {
        let data = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &self.path).await?;

        let modified = fs::metadata(&self.path).await?.modified()?;
        Ok(modified)
    }

    /// Last-modified marker of the file on disk, `None` when absent.
    pub async fn modified(&self) -> Result<Option<SystemTime>> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
