//! Database handle used by virtual switch tests.
//!
//! A [`DvsDatabase`] binds a [`KvStore`] to the [`DbId`] it serves and to a
//! default [`PollingConfig`]. Tests receive these handles explicitly instead
//! of reaching for shared fixtures.

use crate::error::{DvsError, DvsResult};
use crate::polling::{poll_until, wait_for_entry_condition, PollingConfig};
use crate::store::{DbId, FieldValues, FieldValuesExt, KvStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Read/write/wait access to one SONiC database.
#[derive(Clone)]
pub struct DvsDatabase {
    store: Arc<dyn KvStore>,
    db: DbId,
    polling: PollingConfig,
}

impl std::fmt::Debug for DvsDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DvsDatabase")
            .field("db", &self.db)
            .field("polling", &self.polling)
            .finish()
    }
}

impl DvsDatabase {
    /// Wraps `store` as database `db` with the default polling configuration.
    pub fn new(store: Arc<dyn KvStore>, db: DbId) -> Self {
        Self {
            store,
            db,
            polling: PollingConfig::default(),
        }
    }

    /// Replaces the polling configuration used when a wait is given `None`.
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn db(&self) -> DbId {
        self.db
    }

    fn config(&self, polling: Option<PollingConfig>) -> PollingConfig {
        polling.unwrap_or(self.polling)
    }

    fn describe(&self, table: &str) -> String {
        format!("{} {}", self.db.name(), table)
    }

    /// Reads an entry; absent entries read as empty.
    pub async fn get_entry(&self, table: &str, key: &str) -> DvsResult<FieldValues> {
        Ok(self.store.get_entry(table, key).await?)
    }

    /// Merges `fields` into an entry.
    pub async fn update_entry(&self, table: &str, key: &str, fields: &FieldValues) -> DvsResult<()> {
        Ok(self.store.update_entry(table, key, fields).await?)
    }

    /// Replaces an entry with exactly `fields`.
    pub async fn create_entry(&self, table: &str, key: &str, fields: &FieldValues) -> DvsResult<()> {
        self.store.delete_entry(table, key).await?;
        Ok(self.store.update_entry(table, key, fields).await?)
    }

    pub async fn delete_entry(&self, table: &str, key: &str) -> DvsResult<()> {
        Ok(self.store.delete_entry(table, key).await?)
    }

    /// Lists the keys of a table, sorted.
    pub async fn get_keys(&self, table: &str) -> DvsResult<Vec<String>> {
        let mut keys = self.store.get_keys(table).await?;
        keys.sort();
        Ok(keys)
    }

    /// Waits until every field in `expected` holds its expected value.
    #[instrument(skip(self, expected, polling), fields(db = self.db.name()))]
    pub async fn wait_for_field_match(
        &self,
        table: &str,
        key: &str,
        expected: &FieldValues,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        if expected.is_empty() {
            return Err(DvsError::invalid_argument(
                "expected_fields",
                "must name at least one field",
            ));
        }
        self.wait_for_entry_predicate(table, key, expected, polling, |observed| {
            observed.contains_all(expected)
        })
        .await
    }

    /// Waits until the entry holds exactly `expected`, no more and no less.
    #[instrument(skip(self, expected, polling), fields(db = self.db.name()))]
    pub async fn wait_for_exact_match(
        &self,
        table: &str,
        key: &str,
        expected: &FieldValues,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        self.wait_for_entry_predicate(table, key, expected, polling, |observed| observed == expected)
            .await
    }

    /// Waits until every field in `old_fields` differs from the given value.
    ///
    /// A field that is absent counts as changed.
    #[instrument(skip(self, old_fields, polling), fields(db = self.db.name()))]
    pub async fn wait_for_field_negative_match(
        &self,
        table: &str,
        key: &str,
        old_fields: &FieldValues,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        if old_fields.is_empty() {
            return Err(DvsError::invalid_argument(
                "old_fields",
                "must name at least one field",
            ));
        }
        self.wait_for_entry_predicate(table, key, old_fields, polling, |observed| {
            old_fields
                .iter()
                .all(|(field, old)| observed.get(field) != Some(old))
        })
        .await
    }

    /// Waits until the entry exists with at least one field.
    #[instrument(skip(self, polling), fields(db = self.db.name()))]
    pub async fn wait_for_entry(
        &self,
        table: &str,
        key: &str,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        self.wait_for_entry_predicate(table, key, &FieldValues::new(), polling, |observed| {
            !observed.is_empty()
        })
        .await
    }

    /// Waits until the entry is gone.
    #[instrument(skip(self, polling), fields(db = self.db.name()))]
    pub async fn wait_for_deleted_entry(
        &self,
        table: &str,
        key: &str,
        polling: Option<PollingConfig>,
    ) -> DvsResult<()> {
        self.wait_for_entry_predicate(table, key, &FieldValues::new(), polling, FieldValues::is_empty)
            .await
            .map(|_| ())
    }

    /// Waits until `predicate` accepts the entry.
    ///
    /// `expected` only feeds the timeout diagnostic, so callers with their
    /// own notion of a match (SAI list attributes, for instance) still get a
    /// readable report.
    pub async fn wait_for_entry_predicate<P>(
        &self,
        table: &str,
        key: &str,
        expected: &FieldValues,
        polling: Option<PollingConfig>,
        predicate: P,
    ) -> DvsResult<FieldValues>
    where
        P: Fn(&FieldValues) -> bool,
    {
        let config = self.config(polling);
        wait_for_entry_condition(
            self.store.as_ref(),
            Some(self.db.name()),
            table,
            key,
            expected,
            &config,
            predicate,
        )
        .await
    }

    /// Waits until `table` holds exactly `count` keys and returns them.
    #[instrument(skip(self, polling), fields(db = self.db.name()))]
    pub async fn wait_for_n_keys(
        &self,
        table: &str,
        count: usize,
        polling: Option<PollingConfig>,
    ) -> DvsResult<Vec<String>> {
        self.wait_keys(
            table,
            format!("{} keys in {}", count, self.describe(table)),
            polling,
            |keys| keys.len() == count,
        )
        .await
    }

    /// Waits until every key in `expected` is present in `table`.
    #[instrument(skip(self, expected, polling), fields(db = self.db.name()))]
    pub async fn wait_for_matching_keys(
        &self,
        table: &str,
        expected: &[&str],
        polling: Option<PollingConfig>,
    ) -> DvsResult<Vec<String>> {
        self.wait_keys(
            table,
            format!("keys {:?} in {}", expected, self.describe(table)),
            polling,
            |keys| expected.iter().all(|k| keys.contains(*k)),
        )
        .await
    }

    /// Waits until none of `deleted` is present in `table`.
    #[instrument(skip(self, deleted, polling), fields(db = self.db.name()))]
    pub async fn wait_for_deleted_keys(
        &self,
        table: &str,
        deleted: &[&str],
        polling: Option<PollingConfig>,
    ) -> DvsResult<Vec<String>> {
        self.wait_keys(
            table,
            format!("removal of {:?} from {}", deleted, self.describe(table)),
            polling,
            |keys| deleted.iter().all(|k| !keys.contains(*k)),
        )
        .await
    }

    async fn wait_keys<P>(
        &self,
        table: &str,
        condition: String,
        polling: Option<PollingConfig>,
        predicate: P,
    ) -> DvsResult<Vec<String>>
    where
        P: Fn(&BTreeSet<String>) -> bool,
    {
        if table.is_empty() {
            return Err(DvsError::invalid_argument("table", "must not be empty"));
        }

        let config = self.config(polling);
        let predicate = &predicate;
        let report = poll_until(&config, || async move {
            let keys = self.get_keys_lenient(table).await?;
            Ok((predicate(&keys), keys))
        })
        .await?;

        let done = report.is_done();
        let keys: Vec<String> = report.last.into_iter().collect();
        if done {
            info!(%condition, polls = report.polls, "Key condition satisfied");
            return Ok(keys);
        }

        warn!(%condition, observed = ?keys, polls = report.polls, "Timed out waiting for keys");
        Err(DvsError::ConditionTimeout {
            condition,
            observed: format!("{:?}", keys),
            elapsed: report.elapsed,
            polls: report.polls,
        })
    }

    async fn get_keys_lenient(&self, table: &str) -> DvsResult<BTreeSet<String>> {
        match self.store.get_keys(table).await {
            Ok(keys) => Ok(keys.into_iter().collect()),
            Err(e) if e.is_retryable() => Ok(BTreeSet::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_values;
    use crate::store::InMemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn state_db() -> (InMemoryStore, DvsDatabase) {
        let store = InMemoryStore::new();
        let db = DvsDatabase::new(Arc::new(store.clone()), DbId::StateDb).with_polling(
            PollingConfig::new(Duration::from_millis(100), Duration::from_secs(2), false),
        );
        (store, db)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_entry_replaces_fields() {
        let (_, db) = state_db();
        db.update_entry("FABRIC_PORT_TABLE", "PORT1", &field_values! { "STATUS" => "up", "TEST" => "TEST" })
            .await
            .unwrap();
        db.create_entry("FABRIC_PORT_TABLE", "PORT1", &field_values! { "STATUS" => "down" })
            .await
            .unwrap();

        assert_eq!(
            db.get_entry("FABRIC_PORT_TABLE", "PORT1").await.unwrap(),
            field_values! { "STATUS" => "down" }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_field_match_ignores_unlisted_fields() {
        let (_, db) = state_db();
        db.update_entry(
            "FABRIC_PORT_TABLE",
            "PORT2",
            &field_values! { "STATUS" => "up", "AUTO_ISOLATED" => "0" },
        )
        .await
        .unwrap();

        let observed = db
            .wait_for_field_match("FABRIC_PORT_TABLE", "PORT2", &field_values! { "STATUS" => "up" }, None)
            .await
            .unwrap();
        assert_eq!(observed.get_field("AUTO_ISOLATED"), Some("0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_exact_match_rejects_extra_fields() {
        let (_, db) = state_db();
        db.update_entry("SWITCH_HASH", "GLOBAL", &field_values! { "ecmp_hash" => "DST_MAC", "lag_hash" => "SRC_MAC" })
            .await
            .unwrap();

        let err = db
            .wait_for_exact_match("SWITCH_HASH", "GLOBAL", &field_values! { "ecmp_hash" => "DST_MAC" }, None)
            .await
            .unwrap_err();
        match err {
            DvsError::Timeout { target, observed, .. } => {
                assert_eq!(target, "STATE_DB SWITCH_HASH|GLOBAL");
                assert_eq!(observed.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_field_negative_match() {
        let (store, db) = state_db();
        store
            .update_entry("FABRIC_PORT_TABLE", "PORT3", &field_values! { "AUTO_ISOLATED" => "1" })
            .await
            .unwrap();

        let writer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            writer
                .update_entry("FABRIC_PORT_TABLE", "PORT3", &field_values! { "AUTO_ISOLATED" => "0" })
                .await
                .unwrap();
        });

        let observed = db
            .wait_for_field_negative_match(
                "FABRIC_PORT_TABLE",
                "PORT3",
                &field_values! { "AUTO_ISOLATED" => "1" },
                None,
            )
            .await
            .unwrap();
        assert_eq!(observed.get_field("AUTO_ISOLATED"), Some("0"));
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_entry_and_deleted_entry() {
        let (store, db) = state_db();
        let writer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            writer
                .update_entry("PORT_TABLE", "Ethernet0", &field_values! { "state" => "ok" })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
            writer.delete_entry("PORT_TABLE", "Ethernet0").await.unwrap();
        });

        let entry = db.wait_for_entry("PORT_TABLE", "Ethernet0", None).await.unwrap();
        assert_eq!(entry, field_values! { "state" => "ok" });
        db.wait_for_deleted_entry("PORT_TABLE", "Ethernet0", None)
            .await
            .unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_n_keys_timeout_reports_keys() {
        let (_, db) = state_db();
        db.update_entry("FABRIC_PORT_TABLE", "PORT1", &field_values! { "STATUS" => "up" })
            .await
            .unwrap();

        let keys = db.wait_for_n_keys("FABRIC_PORT_TABLE", 1, None).await.unwrap();
        assert_eq!(keys, vec!["PORT1".to_string()]);

        let err = db
            .wait_for_n_keys("FABRIC_PORT_TABLE", 2, None)
            .await
            .unwrap_err();
        match err {
            DvsError::ConditionTimeout { condition, observed, .. } => {
                assert_eq!(condition, "2 keys in STATE_DB FABRIC_PORT_TABLE");
                assert!(observed.contains("PORT1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_matching_and_deleted_keys() {
        let (store, db) = state_db();
        for port in ["PORT1", "PORT2", "PORT3"] {
            store
                .update_entry("FABRIC_PORT_TABLE", port, &field_values! { "STATUS" => "up" })
                .await
                .unwrap();
        }

        let keys = db
            .wait_for_matching_keys("FABRIC_PORT_TABLE", &["PORT1", "PORT3"], None)
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);

        store.delete_entry("FABRIC_PORT_TABLE", "PORT2").await.unwrap();
        let keys = db
            .wait_for_deleted_keys("FABRIC_PORT_TABLE", &["PORT2"], None)
            .await
            .unwrap();
        assert_eq!(keys, vec!["PORT1".to_string(), "PORT3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_polling_overrides_default() {
        let (_, db) = state_db();
        let polling = PollingConfig::new(Duration::from_secs(1), Duration::from_secs(3), false);

        let start = tokio::time::Instant::now();
        let err = db
            .wait_for_field_match("FABRIC_PORT_TABLE", "PORT9", &field_values! { "STATUS" => "up" }, Some(polling))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
