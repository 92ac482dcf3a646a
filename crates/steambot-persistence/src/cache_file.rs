//! `CacheFile`: a write-back cache layered over [`DataFile`], grounded on
//! `original_source/Headers/CacheFile.hpp` (used for e.g. `AppInfo.json`).
//! A cache marked dirty flushes to disk at most once per 60 seconds; a
//! forced flush bypasses the debounce, and any remaining dirty state is
//! flushed when the cache is dropped.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    sync::Mutex,
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::datafile::{DataFile, DataFileError, Outcome};
use std::sync::Arc;

const FLUSH_DEBOUNCE: Duration = Duration::from_secs(60);

pub struct CacheFile {
    file: Arc<DataFile>,
    /// In-memory working copy. `mutate_deferred` only ever touches this;
    /// `flush`/`tick` are what push it through to `file`.
    cached: Mutex<Value>,
    dirty: AtomicBool,
    last_flush: Mutex<Instant>,
}

impl CacheFile {
    pub fn new(file: Arc<DataFile>) -> Self {
        let cached = file.examine(|root| root.clone());
        Self {
            file,
            cached: Mutex::new(cached),
            dirty: AtomicBool::new(false),
            last_flush: Mutex::new(Instant::now() - FLUSH_DEBOUNCE),
        }
    }

    /// Reads the current cached root, including any not-yet-flushed deferred
    /// mutations. Does not imply a flush.
    pub fn examine<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Value) -> R,
    {
        f(&self.cached.lock().unwrap())
    }

    /// Mutates the in-memory root and writes through to disk immediately.
    pub fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let snapshot = {
            let mut cached = self.cached.lock().unwrap();
            f(&mut cached);
            cached.clone()
        };
        let _ = self.file.update(|root| {
            *root = snapshot.clone();
            Ok(Outcome::Persist(()))
        });
        self.dirty.store(false, Ordering::SeqCst);
        *self.last_flush.lock().unwrap() = Instant::now();
    }

    /// Mutates only the in-memory root and marks the cache dirty; the
    /// change reaches `file` (and disk) only from [`CacheFile::tick`],
    /// [`CacheFile::flush`], or drop.
    pub fn mutate_deferred<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        f(&mut self.cached.lock().unwrap());
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Flushes if dirty and the debounce window has elapsed.
    pub fn tick(&self) -> Result<(), DataFileError> {
        if !self.is_dirty() {
            return Ok(());
        }
        if self.last_flush.lock().unwrap().elapsed() < FLUSH_DEBOUNCE {
            return Ok(());
        }
        self.flush()
    }

    /// Flushes unconditionally, bypassing the debounce window: writes the
    /// in-memory root through to `file` (and disk).
    pub fn flush(&self) -> Result<(), DataFileError> {
        let snapshot = self.cached.lock().unwrap().clone();
        self.file.update(|root| {
            *root = snapshot;
            Ok(Outcome::Persist(()))
        })?;
        self.dirty.store(false, Ordering::SeqCst);
        *self.last_flush.lock().unwrap() = Instant::now();
        Ok(())
    }
}

impl Drop for CacheFile {
    fn drop(&mut self) {
        if self.is_dirty() {
            if let Err(err) = self.flush() {
                tracing::warn!(target: "steambot::persistence", %err, "failed to flush cache file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::DataFileFlavor;
    use serde_json::json;

    #[test]
    fn mutate_writes_through_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFile::get(dir.path(), "AppInfo.json", DataFileFlavor::Steam).unwrap();
        let cache = CacheFile::new(file.clone());
        cache.mutate(|root| root["440"] = json!({"name": "Team Fortress 2"}));
        assert!(!cache.is_dirty());
        assert_eq!(file.examine(|root| root["440"]["name"].clone()), json!("Team Fortress 2"));
    }

    #[test]
    fn deferred_mutation_marks_dirty_until_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFile::get(dir.path(), "AppInfo2.json", DataFileFlavor::Steam).unwrap();
        let cache = CacheFile::new(file);
        cache.mutate_deferred(|root| root["570"] = json!({"name": "Dota 2"}));
        assert!(cache.is_dirty());
        cache.flush().unwrap();
        assert!(!cache.is_dirty());
    }

    #[test]
    fn deferred_mutation_does_not_reach_disk_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFile::get(dir.path(), "AppInfo3.json", DataFileFlavor::Steam).unwrap();
        let cache = CacheFile::new(file.clone());
        cache.mutate_deferred(|root| root["730"] = json!({"name": "Counter-Strike 2"}));

        // Visible through the cache...
        assert_eq!(cache.examine(|root| root["730"]["name"].clone()), json!("Counter-Strike 2"));
        // ...but not yet pushed through to the underlying DataFile.
        assert_eq!(file.examine(|root| root.get("730").cloned()), None);

        cache.flush().unwrap();
        assert_eq!(file.examine(|root| root["730"]["name"].clone()), json!("Counter-Strike 2"));
    }

    #[test]
    fn tick_defers_within_the_debounce_window() {
        let dir = tempfile::tempdir().unwrap();
        let file = DataFile::get(dir.path(), "AppInfo4.json", DataFileFlavor::Steam).unwrap();
        let cache = CacheFile::new(file.clone());
        cache.mutate_deferred(|root| root["4000"] = json!({"name": "Garry's Mod"}));

        cache.tick().unwrap();
        assert!(cache.is_dirty());
        assert_eq!(file.examine(|root| root.get("4000").cloned()), None);
    }
}
