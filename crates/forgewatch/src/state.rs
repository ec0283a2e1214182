//! On-disk persistence of the [`Ledger`].
//!
//! The state file is one JSON document, replaced atomically on every save:
//! write `<path>.tmp`, fsync it, rename over `<path>`, fsync the directory.
//! A reader sees either the previous state or the new one, never a torn
//! write.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{ActivityMarker, EventId, Ledger};
use crate::model::RepoId;

/// Current schema version. Increment on breaking layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file {path} has schema version {got}, expected {expected}")]
    SchemaMismatch {
        path: PathBuf,
        expected: u32,
        got: u32,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// JSON layout of the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub known_repositories: BTreeSet<RepoId>,
    pub delivered_events: BTreeSet<EventId>,
    #[serde(default)]
    pub markers: BTreeMap<RepoId, ActivityMarker>,
    #[serde(default)]
    pub scan_offset: usize,
}

impl PersistedState {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            known_repositories: ledger.known().clone(),
            delivered_events: ledger.delivered().clone(),
            markers: ledger.markers().clone(),
            scan_offset: ledger.scan_offset(),
        }
    }

    pub fn into_ledger(self) -> Ledger {
        Ledger::from_parts(
            self.known_repositories,
            self.delivered_events,
            self.markers,
            self.scan_offset,
        )
    }
}

/// Only the version field, read before the full document so a future
/// layout is reported as a version mismatch rather than as corruption.
#[derive(Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

/// Location of the state file and the operations on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Read the persisted document, `None` if the file does not exist.
    pub fn load_persisted(&self) -> Result<Option<PersistedState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let corrupt = |source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        };
        let probe: VersionProbe = serde_json::from_slice(&bytes).map_err(corrupt)?;
        if probe.schema_version != SCHEMA_VERSION {
            return Err(StateError::SchemaMismatch {
                path: self.path.clone(),
                expected: SCHEMA_VERSION,
                got: probe.schema_version,
            });
        }
        let state = serde_json::from_slice(&bytes).map_err(corrupt)?;
        Ok(Some(state))
    }

    /// Load the ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<Ledger> {
        Ok(self
            .load_persisted()?
            .map(PersistedState::into_ledger)
            .unwrap_or_default())
    }

    /// Atomically replace the state file with `ledger`.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let state = PersistedState::from_ledger(ledger);
        let bytes = serde_json::to_vec_pretty(&state).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        if let Some(parent) = &parent {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| self.io_error(e))?;
            file.write_all(&bytes).map_err(|e| self.io_error(e))?;
            file.sync_all().map_err(|e| self.io_error(e))?;
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        let dir = parent.unwrap_or_else(|| PathBuf::from("."));
        fsync_dir(&dir).map_err(|e| self.io_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            known = ledger.known().len(),
            delivered = ledger.delivered().len(),
            "State saved"
        );
        Ok(())
    }

    /// Delete the state file. Returns whether a file was removed.
    pub fn reset(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Make the directory entry of a rename durable.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
