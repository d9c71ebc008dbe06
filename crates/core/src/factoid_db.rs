//! Factoid: a small file-backed knowledge base of keyed text facts.
//!
//! A [`FactoidDb`] pairs two [`LineStore`]s: the *fact store* maps a key to
//! one or more lines of text, and the *group index* maps the same key to
//! the set of groups that gate its visibility. A line beginning with `=` is
//! an alias that [`resolve_fact`] follows to another key.
//!
//! A [`Registry`] routes an external context (for example a chat channel)
//! to one of several named databases living side by side in a data
//! directory.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use factoid::{resolve_fact, DeleteLines, FactoidDb, StoreOptions};
//!
//! let db = FactoidDb::open("facts-store.redb", "facts-index.redb", StoreOptions::default()).unwrap();
//!
//! db.add_fact("vector", "=std::vector", &[]).unwrap();
//! db.add_fact("std::vector", "A contiguous growable array.", &["std"]).unwrap();
//!
//! // Group-gated lookup, then alias expansion for display
//! let lines = resolve_fact(&db, "vector", &["std"]).unwrap();
//! assert_eq!(lines, vec!["A contiguous growable array."]);
//!
//! db.del_fact("vector", DeleteLines::All, &[]).unwrap();
//! ```

mod line_store;
mod registry;
mod resolve;
mod wildcard;

pub use line_store::LineStore;
pub use registry::{is_valid_database_name, Registry, RegistryConfig};
pub use resolve::{alias_target, resolve_fact, MAX_ALIAS_DEPTH};
pub use wildcard::WildPattern;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FactoidError {
    #[error("fact '{key}' not found within the specified group(s)")]
    GroupMismatch { key: String },
    #[error("line number for key '{key}' does not exist: {line} (key has {count} line(s))")]
    LineOutOfRange {
        key: String,
        line: usize,
        count: usize,
    },
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("invalid database name: {0:?} (use letters and digits, not starting with a digit)")]
    NameInvalid(String),
    #[error("database already exists: {0}")]
    NameExists(String),
    #[error("database not found: {0}")]
    NotFound(String),
    #[error("the default database cannot be renamed or removed: {0}")]
    DefaultDatabase(String),
    #[error("invalid wildcard pattern: {0}")]
    InvalidPattern(String),
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(String),
    #[error("rename {from} -> {to} left both copies on disk: {reason}")]
    PartialRename {
        from: String,
        to: String,
        reason: String,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redb::DatabaseError> for FactoidError {
    fn from(e: redb::DatabaseError) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}
impl From<redb::TransactionError> for FactoidError {
    fn from(e: redb::TransactionError) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}
impl From<redb::TableError> for FactoidError {
    fn from(e: redb::TableError) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}
impl From<redb::StorageError> for FactoidError {
    fn from(e: redb::StorageError) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}
impl From<redb::CommitError> for FactoidError {
    fn from(e: redb::CommitError) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}
impl From<std::io::Error> for FactoidError {
    fn from(e: std::io::Error) -> Self {
        FactoidError::BackingStoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FactoidError>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Fold a key or group name for comparison.
///
/// Every case-insensitive equality or set-membership test on keys and
/// groups goes through here.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
}

/// Well-known metadata attribute names.
pub mod meta {
    pub const TITLE: &str = "Title";
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
}

/// Metadata lives in the fact store under this prefix. The leading control
/// character keeps it out of reach of keys typed by users.
const METADATA_PREFIX: &str = "\u{1}meta:";

// Folded, so a case-insensitive store cannot reach a metadata slot
// through another spelling of the prefix.
fn is_reserved(key: &str) -> bool {
    normalize(key).starts_with(METADATA_PREFIX)
}

fn metadata_key(name: &str) -> String {
    format!("{METADATA_PREFIX}{name}")
}

/// Per-database options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Treat keys that differ only in case as the same key.
    pub case_insensitive_keys: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            case_insensitive_keys: true,
        }
    }
}

/// Which lines [`FactoidDb::del_fact`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteLines {
    /// Every line under the key.
    All,
    /// One line, numbered from 1.
    Line(usize),
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

struct Stores {
    facts: LineStore,
    index: LineStore,
    #[cfg(test)]
    fail_stamp: bool,
}

impl Stores {
    /// The key's groups, folded.
    fn groups_of(&self, key: &str) -> BTreeSet<String> {
        self.index.get_set(key).iter().map(|g| normalize(g)).collect()
    }

    fn in_any_group(&self, key: &str, wanted: &BTreeSet<String>) -> bool {
        self.groups_of(key).iter().any(|g| wanted.contains(g))
    }

    fn merge_groups(&mut self, key: &str, groups: &BTreeSet<String>) -> Result<()> {
        let mut current = self.groups_of(key);
        let before = current.len();
        current.extend(groups.iter().cloned());
        if current.len() != before {
            self.index.set_from(key, current)?;
        }
        Ok(())
    }

    /// Refresh the `Updated` stamp. The mutation it follows is already
    /// committed, so a failure here is logged rather than returned.
    fn touch(&mut self) {
        if let Err(e) = self.write_stamp() {
            warn!(error = %e, "could not refresh Updated timestamp");
        }
    }

    fn write_stamp(&mut self) -> Result<()> {
        #[cfg(test)]
        {
            if self.fail_stamp {
                return Err(FactoidError::Internal("injected failure".into()));
            }
        }
        self.facts
            .set_from(&metadata_key(meta::UPDATED), [Utc::now().to_rfc3339()])
    }
}

fn group_filter(groups: &[&str]) -> BTreeSet<String> {
    groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(normalize)
        .collect()
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() || is_reserved(key) {
        return Err(FactoidError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// One factoid database: a fact store, its group index and metadata.
///
/// Both stores sit behind one lock so that a multi-step mutation such as
/// [`add_fact`](FactoidDb::add_fact) (append, then merge groups) is seen
/// whole by other threads.
pub struct FactoidDb {
    stores: Mutex<Stores>,
    options: StoreOptions,
}

impl FactoidDb {
    /// Open or create a database from its two backing files.
    pub fn open(
        store_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self> {
        let facts = LineStore::open(store_path, options.case_insensitive_keys)?;
        let index = LineStore::open(index_path, options.case_insensitive_keys)?;
        Ok(Self::from_stores(facts, index, options))
    }

    /// Create a database with no files behind it.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let facts = LineStore::open_in_memory(options.case_insensitive_keys)?;
        let index = LineStore::open_in_memory(options.case_insensitive_keys)?;
        Ok(Self::from_stores(facts, index, options))
    }

    fn from_stores(facts: LineStore, index: LineStore, options: StoreOptions) -> Self {
        Self {
            stores: Mutex::new(Stores {
                facts,
                index,
                #[cfg(test)]
                fail_stamp: false,
            }),
            options,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Stores>> {
        self.stores
            .lock()
            .map_err(|_| FactoidError::Internal("factoid store lock poisoned".into()))
    }

    /// The form of `key` used for equality under this database's key rule.
    pub fn canonical_key(&self, key: &str) -> String {
        if self.options.case_insensitive_keys {
            normalize(key)
        } else {
            key.to_string()
        }
    }

    /// Append `fact` as a new line under `key` and merge `groups` into the
    /// key's group set.
    ///
    /// Re-adding identical text appends a duplicate line.
    pub fn add_fact(&self, key: &str, fact: &str, groups: &[&str]) -> Result<()> {
        check_key(key)?;
        let groups = group_filter(groups);
        let mut stores = self.lock()?;
        stores.facts.add(key, fact)?;
        if !groups.is_empty() {
            stores.merge_groups(key, &groups)?;
        }
        stores.touch();
        debug!(key, groups = groups.len(), "fact added");
        Ok(())
    }

    /// Union `groups` into the key's group set.
    pub fn add_to_groups(&self, key: &str, groups: &[&str]) -> Result<()> {
        check_key(key)?;
        let groups = group_filter(groups);
        if groups.is_empty() {
            return Ok(());
        }
        let mut stores = self.lock()?;
        stores.merge_groups(key, &groups)?;
        stores.touch();
        debug!(key, ?groups, "key added to groups");
        Ok(())
    }

    /// Remove `groups` from the key's group set. Groups the key is not in
    /// are ignored. Removing the last group clears the index entry.
    pub fn del_from_groups(&self, key: &str, groups: &[&str]) -> Result<()> {
        let groups = group_filter(groups);
        let mut stores = self.lock()?;
        let mut current = stores.groups_of(key);
        let before = current.len();
        current.retain(|g| !groups.contains(g));
        if current.len() == before {
            return Ok(());
        }
        if current.is_empty() {
            stores.index.clear(key)?;
        } else {
            stores.index.set_from(key, current)?;
        }
        stores.touch();
        debug!(key, ?groups, "key removed from groups");
        Ok(())
    }

    /// Delete one line or every line under `key`.
    ///
    /// With a non-empty `groups`, the key must belong to at least one of
    /// them or [`FactoidError::GroupMismatch`] is returned. When no lines
    /// remain the key is removed from both the fact store and the group
    /// index. Returns the number of lines removed.
    pub fn del_fact(&self, key: &str, lines: DeleteLines, groups: &[&str]) -> Result<usize> {
        let wanted = group_filter(groups);
        let mut stores = self.lock()?;

        if !wanted.is_empty() && !stores.in_any_group(key, &wanted) {
            return Err(FactoidError::GroupMismatch {
                key: key.to_string(),
            });
        }

        let mut current = stores.facts.get_vec(key);
        let removed = match lines {
            DeleteLines::All => {
                let n = current.len();
                current.clear();
                n
            }
            DeleteLines::Line(n) => {
                if n == 0 || n > current.len() {
                    return Err(FactoidError::LineOutOfRange {
                        key: key.to_string(),
                        line: n,
                        count: current.len(),
                    });
                }
                current.remove(n - 1);
                1
            }
        };

        if current.is_empty() {
            stores.facts.clear(key)?;
            stores.index.clear(key)?;
        } else {
            stores.facts.set_from(key, current)?;
        }
        if removed > 0 {
            stores.touch();
        }
        debug!(key, removed, "fact lines deleted");
        Ok(removed)
    }

    /// Keys matching `wild_key`, restricted to `groups` when non-empty.
    pub fn find_fact(&self, wild_key: &str, groups: &[&str]) -> Result<BTreeSet<String>> {
        let wanted = group_filter(groups);
        let stores = self.lock()?;
        let keys = stores.facts.get_keys_if_wild(wild_key)?;
        Ok(keys
            .into_iter()
            .filter(|k| !is_reserved(k))
            .filter(|k| wanted.is_empty() || stores.in_any_group(k, &wanted))
            .collect())
    }

    /// Distinct groups, across all keys, matching `wild_group`.
    ///
    /// Matching ignores case; names are returned folded.
    pub fn find_group(&self, wild_group: &str) -> Result<BTreeSet<String>> {
        let wild = WildPattern::new(wild_group, true)?;
        let stores = self.lock()?;
        let mut found = BTreeSet::new();
        for key in stores.index.get_keys() {
            for group in stores.groups_of(&key) {
                if wild.is_match(&group) {
                    found.insert(group);
                }
            }
        }
        Ok(found)
    }

    /// Every line stored under `key`, aliases unexpanded.
    ///
    /// With a non-empty `groups` the key is visible only if it belongs to
    /// at least one of them; otherwise nothing is returned.
    pub fn get_fact(&self, key: &str, groups: &[&str]) -> Result<Vec<String>> {
        if is_reserved(key) {
            return Ok(Vec::new());
        }
        let wanted = group_filter(groups);
        let stores = self.lock()?;
        if wanted.is_empty() || stores.in_any_group(key, &wanted) {
            Ok(stores.facts.get_vec(key))
        } else {
            Ok(Vec::new())
        }
    }

    /// The groups `key` belongs to, folded.
    pub fn groups_of(&self, key: &str) -> Result<BTreeSet<String>> {
        Ok(self.lock()?.groups_of(key))
    }

    /// Every user key in the fact store.
    pub fn keys(&self) -> Result<BTreeSet<String>> {
        let stores = self.lock()?;
        Ok(stores
            .facts
            .get_keys()
            .into_iter()
            .filter(|k| !is_reserved(k))
            .collect())
    }

    /// Re-read both stores from disk.
    pub fn reload(&self) -> Result<()> {
        let mut stores = self.lock()?;
        stores.facts.reload()?;
        stores.index.reload()?;
        debug!("factoid database reloaded");
        Ok(())
    }

    /// Store a database-level attribute.
    pub fn set_metadata(&self, name: &str, value: &str) -> Result<()> {
        self.lock()?.facts.set_from(&metadata_key(name), [value])
    }

    /// Read a database-level attribute, or `default` when unset.
    pub fn get_metadata(&self, name: &str, default: &str) -> Result<String> {
        Ok(self
            .lock()?
            .facts
            .get_vec(&metadata_key(name))
            .into_iter()
            .next()
            .unwrap_or_else(|| default.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp_db() -> (FactoidDb, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = FactoidDb::open(
            dir.path().join("store.redb"),
            dir.path().join("index.redb"),
            StoreOptions::default(),
        )
        .unwrap();
        (db, dir)
    }

    fn mem_db() -> FactoidDb {
        FactoidDb::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn add_and_get_fact_lines() {
        let (db, _tmp) = open_temp_db();
        db.add_fact("raii", "Resource acquisition is initialization.", &[])
            .unwrap();
        db.add_fact("raii", "Tie resource lifetime to object lifetime.", &[])
            .unwrap();

        let lines = db.get_fact("raii", &[]).unwrap();
        assert_eq!(
            lines,
            vec![
                "Resource acquisition is initialization.",
                "Tie resource lifetime to object lifetime."
            ]
        );
    }

    #[test]
    fn duplicate_text_appends_duplicate_line() {
        let db = mem_db();
        db.add_fact("k", "same", &["g"]).unwrap();
        db.add_fact("k", "same", &["g"]).unwrap();
        assert_eq!(db.get_fact("k", &[]).unwrap().len(), 2);
        assert_eq!(db.groups_of("k").unwrap().len(), 1);
    }

    #[test]
    fn empty_or_reserved_key_is_rejected() {
        let db = mem_db();
        assert!(matches!(
            db.add_fact("  ", "x", &[]),
            Err(FactoidError::InvalidKey(_))
        ));
        assert!(matches!(
            db.add_fact(&metadata_key("Title"), "x", &[]),
            Err(FactoidError::InvalidKey(_))
        ));
    }

    #[test]
    fn group_gate_is_all_or_nothing() {
        let db = mem_db();
        db.add_fact("k", "line 1", &["Alpha"]).unwrap();
        db.add_fact("k", "line 2", &[]).unwrap();
        db.add_fact("k", "line 3", &[]).unwrap();

        // No filter: everything.
        assert_eq!(db.get_fact("k", &[]).unwrap().len(), 3);
        // Intersecting filter, any case: everything.
        assert_eq!(db.get_fact("k", &["ALPHA", "beta"]).unwrap().len(), 3);
        // Disjoint filter: nothing.
        assert!(db.get_fact("k", &["beta"]).unwrap().is_empty());
    }

    #[test]
    fn add_fact_merges_groups_rather_than_replacing() {
        let db = mem_db();
        db.add_fact("k", "a", &["one"]).unwrap();
        db.add_fact("k", "b", &["two"]).unwrap();
        db.add_to_groups("k", &["Three", "one"]).unwrap();

        let groups: Vec<String> = db.groups_of("k").unwrap().into_iter().collect();
        assert_eq!(groups, vec!["one", "three", "two"]);
    }

    #[test]
    fn del_from_groups_ignores_absent_and_clears_when_empty() {
        let db = mem_db();
        db.add_fact("k", "a", &["one", "two"]).unwrap();

        db.del_from_groups("k", &["missing"]).unwrap();
        assert_eq!(db.groups_of("k").unwrap().len(), 2);

        db.del_from_groups("k", &["ONE"]).unwrap();
        assert_eq!(
            db.groups_of("k").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["two"]
        );

        db.del_from_groups("k", &["two"]).unwrap();
        assert!(db.groups_of("k").unwrap().is_empty());
        assert!(db.find_group("*").unwrap().is_empty());
        // Facts are untouched and now visible to no group filter.
        assert_eq!(db.get_fact("k", &[]).unwrap(), vec!["a"]);
        assert!(db.get_fact("k", &["two"]).unwrap().is_empty());
    }

    #[test]
    fn deleting_all_lines_clears_groups() {
        let db = mem_db();
        db.add_fact("only", "x", &["solo"]).unwrap();
        db.add_fact("shared", "y", &["common"]).unwrap();
        db.add_fact("only", "z", &["common"]).unwrap();

        let removed = db.del_fact("only", DeleteLines::All, &[]).unwrap();
        assert_eq!(removed, 2);

        assert!(db.get_fact("only", &[]).unwrap().is_empty());
        let groups = db.find_group("*").unwrap();
        assert!(!groups.contains("solo"), "orphan group must be gone");
        assert!(groups.contains("common"));
        assert!(!db.keys().unwrap().contains("only"));
    }

    #[test]
    fn deleting_one_line_keeps_order() {
        let db = mem_db();
        for line in ["first", "second", "third"] {
            db.add_fact("k", line, &[]).unwrap();
        }

        assert_eq!(db.del_fact("k", DeleteLines::Line(2), &[]).unwrap(), 1);
        assert_eq!(db.get_fact("k", &[]).unwrap(), vec!["first", "third"]);

        // Renumbered: line 2 is now "third".
        db.del_fact("k", DeleteLines::Line(2), &[]).unwrap();
        assert_eq!(db.get_fact("k", &[]).unwrap(), vec!["first"]);
    }

    #[test]
    fn deleting_last_line_by_number_clears_key() {
        let db = mem_db();
        db.add_fact("k", "only", &["g"]).unwrap();
        db.del_fact("k", DeleteLines::Line(1), &[]).unwrap();
        assert!(db.keys().unwrap().is_empty());
        assert!(db.groups_of("k").unwrap().is_empty());
    }

    #[test]
    fn out_of_range_line_leaves_state_untouched() {
        let db = mem_db();
        db.add_fact("k", "a", &[]).unwrap();
        db.add_fact("k", "b", &[]).unwrap();

        for bad in [0, 3] {
            let err = db.del_fact("k", DeleteLines::Line(bad), &[]).unwrap_err();
            assert!(matches!(
                err,
                FactoidError::LineOutOfRange { line, count: 2, .. } if line == bad
            ));
        }
        assert_eq!(db.get_fact("k", &[]).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn group_mismatch_leaves_state_untouched() {
        let db = mem_db();
        db.add_fact("k", "a", &["cpp"]).unwrap();

        let err = db.del_fact("k", DeleteLines::All, &["rust"]).unwrap_err();
        assert!(matches!(err, FactoidError::GroupMismatch { .. }));
        assert_eq!(db.get_fact("k", &[]).unwrap(), vec!["a"]);

        // Matching group in a different case is allowed.
        db.del_fact("k", DeleteLines::All, &["CPP"]).unwrap();
        assert!(db.get_fact("k", &[]).unwrap().is_empty());
    }

    #[test]
    fn find_fact_is_case_insensitive_by_default() {
        let db = mem_db();
        db.add_fact("Foo.1", "x", &[]).unwrap();
        db.add_fact("bar", "y", &[]).unwrap();

        let found = db.find_fact("foo.*", &[]).unwrap();
        assert!(found.contains("Foo.1"));
        assert!(!found.contains("bar"));
    }

    #[test]
    fn find_fact_respects_case_sensitive_option() {
        let db = FactoidDb::open_in_memory(StoreOptions {
            case_insensitive_keys: false,
        })
        .unwrap();
        db.add_fact("Foo.1", "x", &[]).unwrap();
        assert!(db.find_fact("foo.*", &[]).unwrap().is_empty());
        assert_eq!(db.find_fact("Foo.*", &[]).unwrap().len(), 1);
    }

    #[test]
    fn find_fact_filters_by_group_intersection() {
        let db = mem_db();
        db.add_fact("P.1", "a", &["P"]).unwrap();
        db.add_fact("P.2", "b", &["P", "core"]).unwrap();
        db.add_fact("Pro.1", "c", &["Pro"]).unwrap();

        let found = db.find_fact("p*", &["CORE", "pro"]).unwrap();
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["P.2", "Pro.1"]
        );
    }

    #[test]
    fn metadata_is_hidden_from_searches() {
        let db = mem_db();
        db.set_metadata(meta::TITLE, "C++ Core Guidelines").unwrap();
        db.add_fact("k", "v", &[]).unwrap();

        assert_eq!(
            db.get_metadata(meta::TITLE, "").unwrap(),
            "C++ Core Guidelines"
        );
        assert_eq!(db.get_metadata("Missing", "fallback").unwrap(), "fallback");
        assert_eq!(
            db.find_fact("*", &[]).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["k"]
        );
        assert!(db.get_fact(&metadata_key(meta::TITLE), &[]).unwrap().is_empty());
    }

    #[test]
    fn mutations_refresh_updated_timestamp() {
        let db = mem_db();
        assert_eq!(db.get_metadata(meta::UPDATED, "never").unwrap(), "never");
        db.add_fact("k", "v", &[]).unwrap();
        let stamp = db.get_metadata(meta::UPDATED, "never").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn failed_timestamp_refresh_does_not_fail_mutation() {
        let db = mem_db();
        db.add_fact("k", "first", &["g"]).unwrap();
        let stamp = db.get_metadata(meta::UPDATED, "never").unwrap();

        db.lock().unwrap().fail_stamp = true;
        db.add_fact("k", "second", &[]).unwrap();
        assert_eq!(db.del_fact("k", DeleteLines::Line(1), &["g"]).unwrap(), 1);
        db.add_to_groups("k", &["h"]).unwrap();
        db.del_from_groups("k", &["g"]).unwrap();

        assert_eq!(db.get_fact("k", &["h"]).unwrap(), vec!["second"]);
        assert_eq!(db.get_metadata(meta::UPDATED, "never").unwrap(), stamp);
    }

    #[test]
    fn metadata_prefix_is_reserved_in_any_case() {
        let db = mem_db();
        db.set_metadata(meta::TITLE, "Real").unwrap();

        let spoofed = "\u{1}META:Title";
        assert!(matches!(
            db.add_fact(spoofed, "spoof", &[]),
            Err(FactoidError::InvalidKey(_))
        ));
        assert!(db.get_fact(spoofed, &[]).unwrap().is_empty());
        assert_eq!(db.get_metadata(meta::TITLE, "").unwrap(), "Real");
    }

    #[test]
    fn find_group_pattern_ignores_case() {
        let db = mem_db();
        db.add_fact("P.1", "a", &["P"]).unwrap();
        db.add_fact("Con.1", "b", &["Con"]).unwrap();

        assert_eq!(
            db.find_group("P*").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["p"]
        );
        assert_eq!(
            db.find_group("{P,CON}").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["con", "p"]
        );
    }

    #[test]
    fn reload_sees_committed_state() {
        let (db, _tmp) = open_temp_db();
        db.add_fact("k", "v", &["g"]).unwrap();
        db.reload().unwrap();
        assert_eq!(db.get_fact("k", &["g"]).unwrap(), vec!["v"]);
    }

    #[test]
    fn facts_and_groups_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("s.redb");
        let index = dir.path().join("i.redb");
        {
            let db = FactoidDb::open(&store, &index, StoreOptions::default()).unwrap();
            db.add_fact("k", "kept", &["g"]).unwrap();
        }
        let db = FactoidDb::open(&store, &index, StoreOptions::default()).unwrap();
        assert_eq!(db.get_fact("k", &["G"]).unwrap(), vec!["kept"]);
    }
}
