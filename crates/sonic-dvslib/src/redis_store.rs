//! Redis-backed [`KvStore`] for a running virtual switch.

use crate::error::StoreResult;
use crate::store::{DbId, FieldValues, KvStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// One SONiC database on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    db: DbId,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("db", &self.db).finish()
    }
}

impl RedisStore {
    /// Connects to `db` on the Redis server at `host:port`.
    #[instrument(skip_all, fields(db = db.name()))]
    pub async fn connect(host: &str, port: u16, db: DbId) -> StoreResult<Self> {
        let url = format!("redis://{}:{}/{}", host, port, db.id());
        debug!(url, "Connecting to Redis database");

        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, db })
    }

    /// The database this store reads and writes.
    pub fn db(&self) -> DbId {
        self.db
    }

    fn table_prefix(&self, table: &str) -> String {
        format!("{}{}", table, self.db.separator())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_entry(&self, table: &str, key: &str) -> StoreResult<FieldValues> {
        let mut conn = self.conn.clone();
        let values: HashMap<String, String> = conn.hgetall(self.db.redis_key(table, key)).await?;
        Ok(values.into_iter().collect())
    }

    async fn update_entry(
        &self,
        table: &str,
        key: &str,
        fields: &FieldValues,
    ) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .collect();
        let _: () = conn
            .hset_multiple(self.db.redis_key(table, key), &pairs)
            .await?;
        Ok(())
    }

    async fn delete_entry(&self, table: &str, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.db.redis_key(table, key)).await?;
        Ok(())
    }

    async fn get_keys(&self, table: &str) -> StoreResult<Vec<String>> {
        let prefix = self.table_prefix(table);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.keys(format!("{}*", prefix)).await?;

        let mut keys: Vec<String> = raw
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
