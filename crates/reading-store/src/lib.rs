//! Cross-process single-slot store for the latest vital-sign reading.
//!
//! The simulator and the query API run as separate processes. They share the
//! current reading through one JSON file that is only ever replaced with an
//! atomic rename, so a reader sees either the previous complete file or the
//! new one. Each process also keeps the last reading it saw in memory and
//! falls back to it whenever the file cannot be read.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;
use vitals_core::{Reading, Settings};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on shared state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed shared state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not replace shared state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Shared state file holds no parameters")]
    Empty,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The latest reading, replicated in a shared file and an in-process cache.
pub struct SharedReadingStore {
    path: PathBuf,
    cache: RwLock<Option<Reading>>,
}

impl SharedReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.shared_state_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish `reading` as the latest one.
    ///
    /// The in-process cache is updated before the file is touched, so an
    /// error here only means other processes will not see this reading.
    pub fn store(&self, reading: &Reading) -> StoreResult<()> {
        self.set_cache(reading.clone());
        self.write_file(reading)
    }

    /// Latest reading: the shared file if readable, otherwise the cache,
    /// otherwise a freshly stored resting-mean default. Never fails.
    pub fn load(&self) -> Reading {
        match self.read_file() {
            Ok(reading) => {
                let reading = match self.cached() {
                    // Same content we wrote ourselves: keep its original timestamp.
                    Some(cached) if cached.same_values(&reading) => cached,
                    _ => reading,
                };
                self.set_cache(reading.clone());
                reading
            }
            Err(e) => {
                tracing::debug!("Shared state unreadable at {}: {}", self.path.display(), e);
                if let Some(cached) = self.cached() {
                    return cached;
                }
                let default = Reading::resting();
                if let Err(e) = self.store(&default) {
                    tracing::warn!(
                        "Could not persist default reading to {}: {}",
                        self.path.display(),
                        e
                    );
                }
                default
            }
        }
    }

    /// The last reading this process stored or loaded, if any.
    pub fn cached(&self) -> Option<Reading> {
        match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_cache(&self, reading: Reading) {
        match self.cache.write() {
            Ok(mut guard) => *guard = Some(reading),
            Err(poisoned) => *poisoned.into_inner() = Some(reading),
        }
    }

    fn write_file(&self, reading: &Reading) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // The temp file must live on the same filesystem for rename to be atomic.
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, reading.values())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        tracing::debug!("Stored reading at {}", self.path.display());
        Ok(())
    }

    fn read_file(&self) -> StoreResult<Reading> {
        let bytes = fs::read(&self.path)?;
        let values: BTreeMap<String, f64> = serde_json::from_slice(&bytes)?;
        if values.is_empty() {
            return Err(StoreError::Empty);
        }
        let timestamp = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Reading::with_timestamp(values, timestamp))
    }
}
