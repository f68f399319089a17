//! Key-value store accessor abstraction.
//!
//! SONiC keeps switch state in Redis hashes addressed by `TABLE<sep>key`.
//! [`KvStore`] is the seam the waiters read through; [`InMemoryStore`] backs
//! unit tests and simulations, [`RedisStore`](crate::RedisStore) talks to a
//! running virtual switch.

use crate::error::StoreResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Field-value pairs of a table entry, ordered by field name.
pub type FieldValues = BTreeMap<String, String>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets the value for a field, returning the default if not present.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    /// Returns true if every field in `expected` is present with the same value.
    fn contains_all(&self, expected: &FieldValues) -> bool;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.get(field).map(String::as_str)
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn contains_all(&self, expected: &FieldValues) -> bool {
        expected
            .iter()
            .all(|(field, value)| self.get(field) == Some(value))
    }
}

/// Builds a [`FieldValues`] map from field => value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut fvs = $crate::FieldValues::new();
        $(fvs.insert($field.to_string(), $value.to_string());)*
        fvs
    }};
}

/// Database identifiers of the SONiC Redis instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbId {
    /// Application database (APPL_DB).
    ApplDb,
    /// ASIC state database (ASIC_DB) written by syncd.
    AsicDb,
    /// Counters database (COUNTERS_DB).
    CountersDb,
    /// Configuration database (CONFIG_DB).
    ConfigDb,
    /// State database (STATE_DB).
    StateDb,
}

impl DbId {
    /// Returns the database name as used in Redis/SONiC.
    pub fn name(&self) -> &'static str {
        match self {
            DbId::ApplDb => "APPL_DB",
            DbId::AsicDb => "ASIC_DB",
            DbId::CountersDb => "COUNTERS_DB",
            DbId::ConfigDb => "CONFIG_DB",
            DbId::StateDb => "STATE_DB",
        }
    }

    /// Returns the Redis database number.
    pub fn id(&self) -> i64 {
        match self {
            DbId::ApplDb => 0,
            DbId::AsicDb => 1,
            DbId::CountersDb => 2,
            DbId::ConfigDb => 4,
            DbId::StateDb => 6,
        }
    }

    /// Returns the separator between table name and key.
    pub fn separator(&self) -> char {
        match self {
            DbId::ConfigDb | DbId::StateDb => '|',
            DbId::ApplDb | DbId::AsicDb | DbId::CountersDb => ':',
        }
    }

    /// Builds the Redis key of `table`/`key` in this database.
    pub fn redis_key(&self, table: &str, key: &str) -> String {
        format!("{}{}{}", table, self.separator(), key)
    }
}

/// Read/write access to the table entries of one database.
///
/// Absent entries read as an empty map. `update_entry` merges fields into
/// the entry the way Redis `HSET` does.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads all fields of an entry.
    async fn get_entry(&self, table: &str, key: &str) -> StoreResult<FieldValues>;

    /// Merges `fields` into an entry, creating it if needed.
    async fn update_entry(&self, table: &str, key: &str, fields: &FieldValues)
        -> StoreResult<()>;

    /// Removes an entry. Deleting a missing entry is not an error.
    async fn delete_entry(&self, table: &str, key: &str) -> StoreResult<()>;

    /// Lists the keys present in a table.
    async fn get_keys(&self, table: &str) -> StoreResult<Vec<String>>;
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    async fn get_entry(&self, table: &str, key: &str) -> StoreResult<FieldValues> {
        (**self).get_entry(table, key).await
    }

    async fn update_entry(
        &self,
        table: &str,
        key: &str,
        fields: &FieldValues,
    ) -> StoreResult<()> {
        (**self).update_entry(table, key, fields).await
    }

    async fn delete_entry(&self, table: &str, key: &str) -> StoreResult<()> {
        (**self).delete_entry(table, key).await
    }

    async fn get_keys(&self, table: &str) -> StoreResult<Vec<String>> {
        (**self).get_keys(table).await
    }
}

#[derive(Debug, Default)]
struct InMemoryInner {
    tables: RwLock<HashMap<String, BTreeMap<String, FieldValues>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Process-local store with Redis hash semantics.
///
/// Clones share the same tables, so a simulated producer task and the test
/// body can hold their own handles.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<InMemoryInner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_entry` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// Number of mutating calls served so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    /// Copies out the current contents of an entry without counting a read.
    pub fn snapshot(&self, table: &str, key: &str) -> FieldValues {
        self.inner
            .tables
            .read()
            .get(table)
            .and_then(|entries| entries.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get_entry(&self, table: &str, key: &str) -> StoreResult<FieldValues> {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.snapshot(table, key))
    }

    async fn update_entry(
        &self,
        table: &str,
        key: &str,
        fields: &FieldValues,
    ) -> StoreResult<()> {
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.inner.tables.write();
        let entry = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default();
        entry.extend(fields.iter().map(|(f, v)| (f.clone(), v.clone())));
        Ok(())
    }

    async fn delete_entry(&self, table: &str, key: &str) -> StoreResult<()> {
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.inner.tables.write();
        if let Some(entries) = tables.get_mut(table) {
            entries.remove(key);
            if entries.is_empty() {
                tables.remove(table);
            }
        }
        Ok(())
    }

    async fn get_keys(&self, table: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .tables
            .read()
            .get(table)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
