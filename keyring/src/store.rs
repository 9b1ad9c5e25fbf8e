/// Persistent key/value storage for the background service
///
/// One namespace per kind of record:
/// - accounts (encrypted key pairs + metadata)
/// - authorized origins
/// - chain metadata definitions
/// - settings
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{KeyringError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Space {
    Accounts,
    AuthUrls,
    Metadata,
    Settings,
}

impl Space {
    pub const ALL: [Space; 4] = [Space::Accounts, Space::AuthUrls, Space::Metadata, Space::Settings];

    /// Column family name
    pub fn name(&self) -> &'static str {
        match self {
            Space::Accounts => "accounts",
            Space::AuthUrls => "auth_urls",
            Space::Metadata => "metadata",
            Space::Settings => "settings",
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, space: Space, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, space: Space, key: &str, value: &[u8]) -> Result<()>;

    fn delete(&self, space: Space, key: &str) -> Result<()>;

    /// All entries of a namespace, ordered by key
    fn entries(&self, space: Space) -> Result<Vec<(String, Vec<u8>)>>;
}

impl dyn KeyValueStore {
    pub fn put_json<T: Serialize>(&self, space: Space, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(space, key, &bytes)
    }

    pub fn get_json<T: DeserializeOwned>(&self, space: Space, key: &str) -> Result<Option<T>> {
        match self.get(space, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every entry of a namespace, skipping records that no longer parse
    pub fn load_all<T: DeserializeOwned>(&self, space: Space) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for (key, bytes) in self.entries(space)? {
            match serde_json::from_slice(&bytes) {
                Ok(value) => values.push(value),
                Err(e) => tracing::warn!("Skipping unreadable {} entry {}: {}", space.name(), key, e),
            }
        }
        Ok(values)
    }
}

/// Volatile store, used when no storage path is configured and in tests
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<(Space, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> KeyringError {
    KeyringError::Storage("memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, space: Space, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(&(space, key.to_string())).cloned())
    }

    fn put(&self, space: Space, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert((space, key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, space: Space, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(&(space, key.to_string()));
        Ok(())
    }

    fn entries(&self, space: Space) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .filter(|((s, _), _)| *s == space)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// RocksDB-backed store with one column family per [`Space`]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open or create storage with column families
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = Space::ALL
            .iter()
            .map(|space| ColumnFamilyDescriptor::new(space.name(), Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, space: Space) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(space.name())
            .ok_or_else(|| KeyringError::Storage(format!("Column family {} not found", space.name())))
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, space: Space, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(space)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    fn put(&self, space: Space, key: &str, value: &[u8]) -> Result<()> {
        let cf = self.cf(space)?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        tracing::debug!("Stored {} entry {}", space.name(), key);
        Ok(())
    }

    fn delete(&self, space: Space, key: &str) -> Result<()> {
        let cf = self.cf(space)?;
        self.db.delete_cf(cf, key.as_bytes())?;
        Ok(())
    }

    fn entries(&self, space: Space) -> Result<Vec<(String, Vec<u8>)>> {
        let cf = self.cf(space)?;
        let mut out = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            out.push((String::from_utf8_lossy(&key).into_owned(), value.to_vec()));
        }

        Ok(out)
    }
}
