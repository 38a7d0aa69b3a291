//! Flat key/value property store, one file per account.
//!
//! The on-disk format is `key=value`, one entry per line, sorted by key.
//! Integers are stored as their decimal string; a missing key reads as
//! `None` (strings) or `0` (integers), matching the behavior the rest of
//! the session layer was written against. Writes are write-through: every
//! mutation rewrites the file via a temp-file rename so a crash never
//! leaves a half-written store.
//!
//! The numbered-list contract used by the host allow list
//! (`user.hosts.host0`, `user.hosts.host1`, ... terminated by the first
//! missing index) is layered on top of this store by the callers; the
//! store itself only knows keys.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::StoreError;

/// A durable string/int keyed property store.
#[derive(Debug)]
pub struct PropertyStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl PropertyStore {
    /// Open a store, loading existing entries if the file is present.
    pub fn open(path: impl Into<PathBuf>) -> Result<PropertyStore, StoreError> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines() {
                    let line = line.trim_end();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        entries.insert(key.to_string(), value.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Read { path, source }),
        }

        Ok(PropertyStore {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_str(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Read an integer; absent or unparseable values read as 0.
    pub fn read_int(&self, key: &str) -> i64 {
        self.entries
            .read()
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn write_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    pub fn write_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.write_str(key, &value.to_string())
    }

    /// Remove a key; removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Remove every key starting with `prefix` in one rewrite.
    pub fn remove_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        if entries.len() != before {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(write_err)?;
        for (key, value) in entries {
            writeln!(file, "{key}={value}").map_err(write_err)?;
        }
        file.sync_all().map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}
