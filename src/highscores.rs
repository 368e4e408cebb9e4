//! Persist the best score in named slots (XDG config dir, or in memory).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "phi-tetris";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key/value slots holding decimal strings.
pub trait ScoreStore {
    fn get(&self, slot: &str) -> Option<String>;
    fn set(&mut self, slot: &str, value: &str) -> Result<(), StoreError>;
}

impl<T: ScoreStore + ?Sized> ScoreStore for Box<T> {
    fn get(&self, slot: &str) -> Option<String> {
        (**self).get(slot)
    }

    fn set(&mut self, slot: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(slot, value)
    }
}

/// Read a slot as a score; 0 on missing/parse error.
pub fn load_score<S: ScoreStore + ?Sized>(store: &S, slot: &str) -> u32 {
    store
        .get(slot)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Returns the default directory for score files (config dir / phi-tetris).
pub fn default_dir() -> PathBuf {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from(".")),
    };
    base.join(APP_DIR)
}

/// One file per slot inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot)
    }
}

impl ScoreStore for FileStore {
    fn get(&self, slot: &str) -> Option<String> {
        fs::read_to_string(self.path(slot)).ok()
    }

    /// Creates the directory if needed.
    fn set(&mut self, slot: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path(slot);
        fs::write(&path, format!("{value}\n")).map_err(|source| StoreError::Io { path, source })
    }
}

/// Slots kept for the lifetime of the process only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: HashMap<String, String>,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn with_slot(mut self, slot: &str, value: &str) -> Self {
        self.slots.insert(slot.to_string(), value.to_string());
        self
    }
}

impl ScoreStore for MemoryStore {
    fn get(&self, slot: &str) -> Option<String> {
        self.slots.get(slot).cloned()
    }

    fn set(&mut self, slot: &str, value: &str) -> Result<(), StoreError> {
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }
}
