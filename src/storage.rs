//! Per-profile key-value storage.
//!
//! Every persisted value (the hydration record, the welcomed flag, the
//! notification permission) is a string stored under a key. The file
//! backend keeps one file per key inside the data directory and writes
//! through a temp file + rename so a reader never sees a half-written value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// String key-value storage, one namespace per profile.
pub trait Storage: Send {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()>;
}

/// Storage backed by a directory, one file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let final_path = self.path_for(key);
        let tmp = self.dir.join(format!("{}.tmp", file_name_for(key)));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &final_path)
    }
}

/// Map a storage key to a safe file name.
fn file_name_for(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.store")
}

/// In-memory storage, used by one-shot tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without going through [`Storage::set`].
    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
