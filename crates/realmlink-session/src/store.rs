//! Key-value persistence for the remembered session.
//!
//! The session layer only ever needs "put this string under section/key and
//! make it durable". [`KeyValueStore`] is that contract; the game decides
//! whether it lands in memory, a JSON file, or an engine save slot.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::StoreError;

/// Section/key string storage with an explicit flush.
///
/// `set` may buffer; only `flush` has to make writes durable.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError>;

    fn flush(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Clones share the same map, which lets a test keep a
/// handle and inspect what the session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(String, String), String>>>,
    flushes: Arc<Mutex<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `flush` has been called.
    pub fn flush_count(&self) -> u64 {
        *self.flushes.lock()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .get(&(section.to_owned(), key.to_owned()))
            .cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert((section.to_owned(), key.to_owned()), value.to_owned());
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        *self.flushes.lock() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// A store persisted as one JSON document of sections.
///
/// `flush` writes a sibling temp file and renames it over the target, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    sections: Mutex<Sections>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let sections = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Sections::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Sections::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };
        tracing::debug!(path = %path.display(), sections = sections.len(), "opened session store");
        Ok(Self {
            path,
            sections: Mutex::new(sections),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .sections
            .lock()
            .get(section)
            .and_then(|s| s.get(key))
            .cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.sections
            .lock()
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&*self.sections.lock())?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
