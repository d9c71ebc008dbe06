//! Durable ordered mapping from a key to a list of lines.
//!
//! Each store is one redb file with a single `lines` table. The redb key is
//! the folded key (see [`normalize`](crate::normalize)); the value is a JSON
//! record carrying the key as first written plus its lines. Mutations are
//! committed before the in-memory cache is touched, so the redb table is
//! always the source of truth and [`LineStore::reload`] can rebuild the
//! cache from it at any time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::wildcard::WildPattern;
use crate::{normalize, Result};

const LINES: TableDefinition<&str, &str> = TableDefinition::new("lines");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    key: String,
    lines: Vec<String>,
}

/// A key -> lines store backed by one redb file.
pub struct LineStore {
    db: Database,
    fold_case: bool,
    cache: BTreeMap<String, Entry>,
}

impl LineStore {
    /// Open or create a store at `path`.
    ///
    /// With `fold_case` set, keys that differ only in case address the
    /// same entry.
    pub fn open(path: impl AsRef<Path>, fold_case: bool) -> Result<Self> {
        let db = Database::create(path.as_ref())?;
        Self::init(db, fold_case)
    }

    /// Create a store with no file behind it. Data is lost on drop.
    pub fn open_in_memory(fold_case: bool) -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db, fold_case)
    }

    fn init(db: Database, fold_case: bool) -> Result<Self> {
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(LINES)?;
            write_txn.commit()?;
        }
        let cache = Self::read_all(&db)?;
        Ok(Self {
            db,
            fold_case,
            cache,
        })
    }

    fn read_all(db: &Database) -> Result<BTreeMap<String, Entry>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(LINES)?;
        let mut cache = BTreeMap::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let record: Entry = serde_json::from_str(v.value())?;
            cache.insert(k.value().to_string(), record);
        }
        Ok(cache)
    }

    fn slot(&self, key: &str) -> String {
        if self.fold_case {
            normalize(key)
        } else {
            key.to_string()
        }
    }

    // Commit first, then mirror into the cache.
    fn write(&mut self, slot: String, record: Option<Entry>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LINES)?;
            match &record {
                Some(r) => {
                    let value = serde_json::to_string(r)?;
                    table.insert(slot.as_str(), value.as_str())?;
                }
                None => {
                    table.remove(slot.as_str())?;
                }
            }
        }
        write_txn.commit()?;

        match record {
            Some(r) => {
                self.cache.insert(slot, r);
            }
            None => {
                self.cache.remove(&slot);
            }
        }
        Ok(())
    }

    /// Append `line` under `key`, keeping existing lines.
    pub fn add(&mut self, key: &str, line: &str) -> Result<()> {
        let slot = self.slot(key);
        let mut record = self.cache.get(&slot).cloned().unwrap_or_else(|| Entry {
            key: key.to_string(),
            lines: Vec::new(),
        });
        record.lines.push(line.to_string());
        self.write(slot, Some(record))
    }

    /// Replace every line under `key`. An empty `lines` clears the key.
    pub fn set_from<I, S>(&mut self, key: &str, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            self.clear(key)?;
            return Ok(());
        }
        let slot = self.slot(key);
        let stored_key = self
            .cache
            .get(&slot)
            .map(|r| r.key.clone())
            .unwrap_or_else(|| key.to_string());
        self.write(
            slot,
            Some(Entry {
                key: stored_key,
                lines,
            }),
        )
    }

    /// Remove `key` entirely. Returns whether anything was removed.
    pub fn clear(&mut self, key: &str) -> Result<bool> {
        let slot = self.slot(key);
        if !self.cache.contains_key(&slot) {
            return Ok(false);
        }
        self.write(slot, None)?;
        Ok(true)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(&self.slot(key))
    }

    /// Lines under `key`, in insertion order.
    pub fn get_vec(&self, key: &str) -> Vec<String> {
        self.cache
            .get(&self.slot(key))
            .map(|r| r.lines.clone())
            .unwrap_or_default()
    }

    /// Distinct lines under `key`.
    pub fn get_set(&self, key: &str) -> BTreeSet<String> {
        self.cache
            .get(&self.slot(key))
            .map(|r| r.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every key, spelled as first written.
    pub fn get_keys(&self) -> BTreeSet<String> {
        self.cache.values().map(|r| r.key.clone()).collect()
    }

    /// Keys matching a shell-style wildcard. Case folding follows the
    /// store's key rule.
    pub fn get_keys_if_wild(&self, pattern: &str) -> Result<BTreeSet<String>> {
        let wild = WildPattern::new(pattern, self.fold_case)?;
        Ok(self
            .cache
            .values()
            .filter(|r| wild.is_match(&r.key))
            .map(|r| r.key.clone())
            .collect())
    }

    /// Discard the cache and re-read every entry from the redb file.
    pub fn reload(&mut self) -> Result<()> {
        self.cache = Self::read_all(&self.db)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
