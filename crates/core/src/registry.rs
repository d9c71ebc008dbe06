//! Named databases and the routing table that selects one per context.
//!
//! Every database is two redb files in the data directory:
//!
//! ```text
//! {prefix}{name}{suffix}-store.{extension}   facts + metadata
//! {prefix}{name}{suffix}-index.{extension}   group memberships
//! ```
//!
//! With the defaults a database called `cppcg` lives in
//! `factoid-cppcg-db-store.redb` and `factoid-cppcg-db-index.redb`. The
//! routing table (context -> database name) is itself a [`LineStore`] in
//! `{prefix}routing.{extension}` so bindings survive a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::{meta, FactoidDb, FactoidError, LineStore, Result, StoreOptions};

/// Where and how the registry keeps its databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub data_dir: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub extension: String,
    /// Database served to contexts with no binding.
    pub default_database: String,
    pub store: StoreOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            prefix: "factoid-".to_string(),
            suffix: "-db".to_string(),
            extension: "redb".to_string(),
            default_database: "default".to_string(),
            store: StoreOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Store,
    Index,
}

impl Part {
    const ALL: [Part; 2] = [Part::Store, Part::Index];

    fn as_str(self) -> &'static str {
        match self {
            Part::Store => "store",
            Part::Index => "index",
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `FACTOID_DATA_DIR`, `FACTOID_FILE_PREFIX`,
    /// `FACTOID_FILE_SUFFIX`, `FACTOID_DEFAULT_DB` and
    /// `FACTOID_CASE_SENSITIVE` (`1`/`true` makes keys case-sensitive).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("FACTOID_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = env::var("FACTOID_FILE_PREFIX") {
            config.prefix = prefix;
        }
        if let Ok(suffix) = env::var("FACTOID_FILE_SUFFIX") {
            config.suffix = suffix;
        }
        if let Ok(name) = env::var("FACTOID_DEFAULT_DB") {
            config.default_database = name;
        }
        if let Ok(flag) = env::var("FACTOID_CASE_SENSITIVE") {
            let on = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
            config.store.case_insensitive_keys = !on;
        }
        config
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    fn file_path(&self, name: &str, part: Part) -> PathBuf {
        self.data_dir.join(format!(
            "{}{}{}-{}.{}",
            self.prefix,
            name,
            self.suffix,
            part.as_str(),
            self.extension
        ))
    }

    /// Path of the fact store file for database `name`.
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.file_path(name, Part::Store)
    }

    /// Path of the group index file for database `name`.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.file_path(name, Part::Index)
    }

    fn routing_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}routing.{}", self.prefix, self.extension))
    }

    /// Recover a database name from a fact store file name.
    fn name_from_file<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let tail = format!("{}-{}.{}", self.suffix, Part::Store.as_str(), self.extension);
        let name = file_name.strip_prefix(&self.prefix)?.strip_suffix(&tail)?;
        is_valid_database_name(name).then_some(name)
    }
}

/// Database names are non-empty, ASCII alphanumeric and do not start with
/// a digit.
pub fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

fn check_name(name: &str) -> Result<()> {
    if is_valid_database_name(name) {
        Ok(())
    } else {
        Err(FactoidError::NameInvalid(name.to_string()))
    }
}

fn open_database(config: &RegistryConfig, name: &str) -> Result<FactoidDb> {
    FactoidDb::open(config.store_path(name), config.index_path(name), config.store)
}

/// Copy `src` to `dst` through a temporary file that is synced before it is
/// renamed into place, so `dst` is either absent or complete.
fn copy_durably(src: &Path, dst: &Path) -> Result<()> {
    let mut tmp = dst.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let copied = fs::copy(src, &tmp)
        .and_then(|_| fs::File::open(&tmp)?.sync_all())
        .and_then(|_| fs::rename(&tmp, dst));
    if let Err(e) = copied {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn sync_dir(dir: &Path) {
    // Not supported everywhere (e.g. Windows); the file syncs already ran.
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Owns every live [`FactoidDb`] and maps routing keys to them.
pub struct Registry {
    config: RegistryConfig,
    default: FactoidDb,
    databases: HashMap<String, FactoidDb>,
    bindings: BTreeMap<String, String>,
    routing: LineStore,
    #[cfg(test)]
    fail_before_remove: bool,
    #[cfg(test)]
    fail_copy_index: bool,
}

impl Registry {
    /// Open the default database and restore persisted bindings.
    ///
    /// A binding whose database is missing or can no longer be loaded is
    /// dropped with a warning rather than failing the whole registry.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        check_name(&config.default_database)?;
        fs::create_dir_all(&config.data_dir)?;

        let default = open_database(&config, &config.default_database)?;
        let routing = LineStore::open(config.routing_path(), false)?;

        let mut registry = Self {
            config,
            default,
            databases: HashMap::new(),
            bindings: BTreeMap::new(),
            routing,
            #[cfg(test)]
            fail_before_remove: false,
            #[cfg(test)]
            fail_copy_index: false,
        };

        for routing_key in registry.routing.get_keys() {
            let Some(name) = registry.routing.get_vec(&routing_key).into_iter().next() else {
                continue;
            };
            // Loading would recreate a deleted database as an empty one.
            let restored = if name == registry.config.default_database || registry.exists(&name) {
                registry.load_inner(&name, &routing_key, false)
            } else {
                Err(FactoidError::NotFound(name.clone()))
            };
            if let Err(e) = restored {
                warn!(routing_key = %routing_key, database = %name, error = %e, "dropping stale binding");
                registry.routing.clear(&routing_key)?;
            }
        }

        info!(
            data_dir = %registry.config.data_dir.display(),
            bindings = registry.bindings.len(),
            "factoid registry opened"
        );
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The database bound to `routing_key`, or the default database.
    pub fn select(&self, routing_key: &str) -> &FactoidDb {
        self.bindings
            .get(routing_key)
            .and_then(|name| self.database(name))
            .unwrap_or(&self.default)
    }

    /// A live database by name, if it is the default or currently loaded.
    pub fn database(&self, name: &str) -> Option<&FactoidDb> {
        if name == self.config.default_database {
            Some(&self.default)
        } else {
            self.databases.get(name)
        }
    }

    pub fn default_database(&self) -> &FactoidDb {
        &self.default
    }

    /// Current routing table, routing key -> database name.
    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Open (creating if absent) database `name` and bind `routing_key` to
    /// it, replacing any previous binding for that key.
    ///
    /// On failure the previous binding and any cached instance are left as
    /// they were.
    pub fn load(&mut self, name: &str, routing_key: &str) -> Result<()> {
        self.load_inner(name, routing_key, true)
    }

    fn load_inner(&mut self, name: &str, routing_key: &str, persist: bool) -> Result<()> {
        check_name(name)?;
        if name != self.config.default_database {
            // A cached instance owns the file lock, so refresh it in place
            // instead of opening a second handle.
            if let Some(db) = self.databases.get(name) {
                db.reload()?;
            } else {
                let db = open_database(&self.config, name)?;
                self.databases.insert(name.to_string(), db);
            }
        }
        if persist {
            self.routing.set_from(routing_key, [name])?;
        }
        self.bindings
            .insert(routing_key.to_string(), name.to_string());
        info!(routing_key, database = name, "database bound");
        Ok(())
    }

    /// Drop the binding for `routing_key`. Returns whether one existed.
    pub fn unbind(&mut self, routing_key: &str) -> Result<bool> {
        self.routing.clear(routing_key)?;
        Ok(self.bindings.remove(routing_key).is_some())
    }

    /// Whether database `name` exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.config.store_path(name).exists()
    }

    /// Create a new, empty database stamped with creation metadata.
    pub fn create(&mut self, name: &str, title: Option<&str>) -> Result<()> {
        check_name(name)?;
        if self.exists(name) || name == self.config.default_database {
            return Err(FactoidError::NameExists(name.to_string()));
        }

        let db = open_database(&self.config, name)?;
        let now = Utc::now().to_rfc3339();
        db.set_metadata(meta::CREATED, &now)?;
        db.set_metadata(meta::UPDATED, &now)?;
        if let Some(title) = title {
            db.set_metadata(meta::TITLE, title)?;
        }
        info!(database = name, "database created");
        Ok(())
    }

    /// Every database in the data directory, sorted by name.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = self.config.name_from_file(file_name) {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Rename database `old` to `new` and move its bindings along.
    ///
    /// The new files are written and synced before anything is deleted.
    /// If removing the old files fails, [`FactoidError::PartialRename`] is
    /// returned: the new database is complete and already bound, and the
    /// old copy remains on disk until removed with [`Registry::remove`].
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        check_name(new)?;
        let default = &self.config.default_database;
        if old == default.as_str() || new == default.as_str() {
            return Err(FactoidError::DefaultDatabase(default.clone()));
        }
        if self.exists(new) {
            return Err(FactoidError::NameExists(new.to_string()));
        }
        if !is_valid_database_name(old) || !self.exists(old) {
            return Err(FactoidError::NotFound(old.to_string()));
        }

        let rebind: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, name)| name.as_str() == old)
            .map(|(key, _)| key.clone())
            .collect();

        // Close the old files before copying them.
        self.databases.remove(old);

        if let Err(e) = self.copy_database(old, new) {
            for key in &rebind {
                if let Err(reload) = self.load_inner(old, key, false) {
                    warn!(routing_key = key.as_str(), database = old, error = %reload, "could not restore binding");
                }
            }
            return Err(e);
        }

        for key in &rebind {
            self.load(new, key)?;
        }

        self.remove_files(old).map_err(|e| FactoidError::PartialRename {
            from: old.to_string(),
            to: new.to_string(),
            reason: e.to_string(),
        })?;

        info!(from = old, to = new, rebound = rebind.len(), "database renamed");
        Ok(())
    }

    fn copy_database(&self, old: &str, new: &str) -> Result<()> {
        let mut placed = Vec::new();
        for part in Part::ALL {
            let dst = self.config.file_path(new, part);
            if let Err(e) = self.copy_part(old, part, &dst) {
                for done in &placed {
                    let _ = fs::remove_file(done);
                }
                return Err(e);
            }
            placed.push(dst);
        }
        sync_dir(&self.config.data_dir);
        Ok(())
    }

    fn copy_part(&self, old: &str, part: Part, dst: &Path) -> Result<()> {
        #[cfg(test)]
        {
            if self.fail_copy_index && part == Part::Index {
                return Err(FactoidError::Internal("injected failure".into()));
            }
        }
        copy_durably(&self.config.file_path(old, part), dst)
    }

    fn remove_files(&self, name: &str) -> Result<()> {
        #[cfg(test)]
        {
            if self.fail_before_remove {
                return Err(FactoidError::Internal("injected failure".into()));
            }
        }
        for part in Part::ALL {
            let path = self.config.file_path(name, part);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        sync_dir(&self.config.data_dir);
        Ok(())
    }

    /// Delete database `name` from disk and unbind every routing key that
    /// pointed at it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if name == self.config.default_database {
            return Err(FactoidError::DefaultDatabase(name.to_string()));
        }
        if !is_valid_database_name(name) || !self.exists(name) {
            return Err(FactoidError::NotFound(name.to_string()));
        }

        let unbind: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, bound)| bound.as_str() == name)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &unbind {
            self.unbind(key)?;
        }

        self.databases.remove(name);
        self.remove_files(name)?;
        info!(database = name, unbound = unbind.len(), "database removed");
        Ok(())
    }
}
