use crate::game::{Game, StatusOverrides};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const MANUAL_FILE: &str = "manual.json";
pub const TAGS_FILE: &str = "tags.json";
pub const OVERRIDES_FILE: &str = "status.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
    #[error("cannot access {path}: {source}")]
    Unavailable { path: String, source: io::Error },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Unavailable {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, raw).map_err(|source| StoreError::Unavailable {
        path: path.display().to_string(),
        source,
    })
}

// Tags, overrides, and the manual ledger are auxiliary: a damaged file is
// reported on stderr and treated as empty so the library stays viewable.
fn load_degrading<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match read_json(path) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(T::default()),
        Err(StoreError::Corrupt { path, source }) => {
            eprintln!("Warning: {path} is corrupt ({source}); starting from an empty store");
            Ok(T::default())
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at: i64,
    pub games: Vec<Game>,
}

/// Last successful Steam fetch. Replaced wholesale on sync; a corrupt
/// snapshot is fatal (the fix is simply to sync again).
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        read_json(&self.path)
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        write_json(&self.path, snapshot)
    }
}

#[derive(Debug, Clone)]
pub struct ManualStore {
    path: PathBuf,
}

impl ManualStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(MANUAL_FILE),
        }
    }

    pub fn load(&self) -> Result<Vec<Game>, StoreError> {
        load_degrading(&self.path)
    }

    pub fn save(&self, games: &[Game]) -> Result<(), StoreError> {
        write_json(&self.path, &games)
    }
}

pub type TagIndex = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct TagStore {
    path: PathBuf,
}

impl TagStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TAGS_FILE),
        }
    }

    pub fn load(&self) -> Result<TagIndex, StoreError> {
        load_degrading(&self.path)
    }

    pub fn save(&self, tags: &TagIndex) -> Result<(), StoreError> {
        write_json(&self.path, tags)
    }
}

#[derive(Debug, Clone)]
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(OVERRIDES_FILE),
        }
    }

    pub fn load(&self) -> Result<StatusOverrides, StoreError> {
        load_degrading(&self.path)
    }

    pub fn save(&self, overrides: &StatusOverrides) -> Result<(), StoreError> {
        write_json(&self.path, overrides)
    }
}
