//! `DataFile`: a named JSON document with shared `examine`/exclusive
//! `update` access and atomic write-temp-then-rename persistence (spec.md
//! §3/§4.11), grounded on `original_source/Headers/DataFile.hpp` and the
//! layered-source merge pattern in `crates/settings/src/settings/store.rs`
//! (there TOML over a `TypeId` registry; here JSON over a single root tree).
//!
//! Two flavors per spec.md §3: `Account` (`Account-<name>.json`) and
//! `Steam` (a process-wide file such as `AppInfo.json`). Every `DataFile`
//! for a given resolved path is a singleton, handed out by [`DataFile::get`].

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, RwLock},
};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// `update`'s closure signalled failure; the in-memory root has been
    /// reloaded from disk and the error is re-raised to the caller.
    #[error("update failed, reloaded from disk: {0}")]
    UpdateFailed(#[source] anyhow::Error),
}

/// Selects the filename convention for [`DataFile::get`].
#[derive(Debug, Clone)]
pub enum DataFileFlavor {
    /// `Account-<name>.json`.
    Account,
    /// A process-wide file, named verbatim (e.g. `AppInfo.json`).
    Steam,
}

fn resolve_path(base_dir: &Path, name: &str, flavor: &DataFileFlavor) -> PathBuf {
    match flavor {
        DataFileFlavor::Account => base_dir.join(format!("Account-{name}.json")),
        DataFileFlavor::Steam => base_dir.join(name),
    }
}

fn load_from_disk(path: &Path) -> Result<Value, DataFileError> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|source| DataFileError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Default::default())),
        Err(source) => Err(DataFileError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Atomically replaces `path` with `value`'s JSON serialization by writing
/// to a temp file in the same directory, then renaming over the target.
pub fn write_atomic(path: &Path, value: &Value) -> Result<(), DataFileError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|source| DataFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let text = serde_json::to_string_pretty(value).expect("Value serialization cannot fail");
    std::io::Write::write_all(&mut temp, text.as_bytes()).map_err(|source| DataFileError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    temp.persist(path).map_err(|err| DataFileError::Write {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Outcome of an [`DataFile::update`] closure: whether the mutated root
/// should be persisted to disk or discarded.
pub enum Outcome<T> {
    Persist(T),
    Discard(T),
}

/// A JSON document backed by a file, with shared/exclusive access and
/// atomic writes. Accessed from multiple tasks on the owning account's
/// thread; the lock serializes them (spec.md §3).
pub struct DataFile {
    path: PathBuf,
    root: RwLock<Value>,
}

impl DataFile {
    fn open(path: PathBuf) -> Result<Arc<Self>, DataFileError> {
        let root = load_from_disk(&path)?;
        Ok(Arc::new(Self {
            path,
            root: RwLock::new(root),
        }))
    }

    /// Returns the singleton `DataFile` for `(name, flavor)` under
    /// `base_dir`, loading it from disk on first access.
    pub fn get(base_dir: &Path, name: &str, flavor: DataFileFlavor) -> Result<Arc<Self>, DataFileError> {
        static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<DataFile>>>> = OnceLock::new();
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));

        let path = resolve_path(base_dir, name, &flavor);
        let mut registry = registry.lock().unwrap();
        if let Some(existing) = registry.get(&path) {
            return Ok(existing.clone());
        }
        let file = Self::open(path.clone())?;
        registry.insert(path, file.clone());
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` under a shared lock with a const reference to the current
    /// root, returning `f`'s result.
    pub fn examine<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Value) -> R,
    {
        let root = self.root.read().unwrap();
        f(&root)
    }

    /// Runs `f` under an exclusive lock with a mutable reference to a
    /// working copy of the root. If `f` returns [`Outcome::Persist`], the
    /// working copy is atomically written to disk and becomes the new root.
    /// If `f` returns [`Outcome::Discard`], the working copy is dropped. If
    /// `f` errs, the in-memory root is reloaded from disk and the error is
    /// propagated (spec.md §4.11/§7).
    pub fn update<F, R>(&self, f: F) -> Result<R, DataFileError>
    where
        F: FnOnce(&mut Value) -> anyhow::Result<Outcome<R>>,
    {
        let mut root = self.root.write().unwrap();
        let mut working = root.clone();
        match f(&mut working) {
            Ok(Outcome::Persist(result)) => {
                write_atomic(&self.path, &working)?;
                *root = working;
                Ok(result)
            }
            Ok(Outcome::Discard(result)) => Ok(result),
            Err(err) => {
                *root = load_from_disk(&self.path)?;
                Err(DataFileError::UpdateFailed(err))
            }
        }
    }
}
