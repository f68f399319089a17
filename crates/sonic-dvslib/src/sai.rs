//! SAI object inspection in ASIC_DB.
//!
//! syncd mirrors every SAI object it creates into ASIC_DB under
//! `ASIC_STATE:<object type>:<oid>`. List attributes are serialized as
//! `<count>:<item>,<item>,...`.

use crate::database::DvsDatabase;
use crate::error::{DvsError, DvsResult};
use crate::polling::PollingConfig;
use crate::store::FieldValues;
use crate::tables::asic_state_table;
use std::collections::BTreeMap;
use tracing::debug;

/// Expected value of one SAI attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaiAttr {
    /// Plain value, compared verbatim.
    Scalar(String),
    /// List value, compared without regard to order.
    List(Vec<String>),
}

impl SaiAttr {
    pub fn scalar(value: impl Into<String>) -> Self {
        SaiAttr::Scalar(value.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SaiAttr::List(items.into_iter().map(Into::into).collect())
    }

    /// Serializes the value the way syncd stores it.
    pub fn to_db_value(&self) -> String {
        match self {
            SaiAttr::Scalar(value) => value.clone(),
            SaiAttr::List(items) if items.is_empty() => "0:null".to_string(),
            SaiAttr::List(items) => format!("{}:{}", items.len(), items.join(",")),
        }
    }

    /// Returns true if the stored ASIC_DB value satisfies this attribute.
    pub fn matches(&self, observed: &str) -> bool {
        match self {
            SaiAttr::Scalar(value) => value == observed,
            SaiAttr::List(items) => match parse_sai_list(observed) {
                Some(mut actual) => {
                    let mut wanted: Vec<&str> = items.iter().map(String::as_str).collect();
                    wanted.sort_unstable();
                    actual.sort_unstable();
                    wanted == actual
                }
                None => false,
            },
        }
    }
}

/// Parses `<count>:<a>,<b>` into its items, checking the count.
fn parse_sai_list(raw: &str) -> Option<Vec<&str>> {
    let (count, items) = raw.split_once(':')?;
    let count: usize = count.parse().ok()?;
    if count == 0 {
        return Some(Vec::new());
    }

    let items: Vec<&str> = items.split(',').filter(|s| !s.is_empty()).collect();
    (items.len() == count).then_some(items)
}

/// Expected SAI attributes of one object, keyed by attribute name.
pub type SaiQualifiers = BTreeMap<String, SaiAttr>;

/// Renders qualifiers as the field-values syncd would have written.
pub fn qualifiers_to_fields(qualifiers: &SaiQualifiers) -> FieldValues {
    qualifiers
        .iter()
        .map(|(attr, value)| (attr.clone(), value.to_db_value()))
        .collect()
}

/// All ASIC_DB objects of one SAI type.
///
/// Objects present when the table is opened are remembered as the switch's
/// defaults, so counts are expressed relative to them.
#[derive(Debug, Clone)]
pub struct SaiObjectTable {
    asic_db: DvsDatabase,
    object_type: String,
    table: String,
    default_ids: Vec<String>,
}

impl SaiObjectTable {
    /// Opens the table for `object_type` and snapshots its current objects.
    pub async fn new(asic_db: DvsDatabase, object_type: &str) -> DvsResult<Self> {
        let table = asic_state_table(object_type);
        let default_ids = asic_db.get_keys(&table).await?;
        debug!(
            object_type,
            defaults = default_ids.len(),
            "Recorded default SAI objects"
        );

        Ok(Self {
            asic_db,
            object_type: object_type.to_string(),
            table,
            default_ids,
        })
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Objects that existed when the table was opened.
    pub fn default_ids(&self) -> &[String] {
        &self.default_ids
    }

    /// Returns all object ids; with `expected`, first waits until exactly
    /// that many objects exist.
    pub async fn get_ids(&self, expected: Option<usize>) -> DvsResult<Vec<String>> {
        match expected {
            Some(count) => self.asic_db.wait_for_n_keys(&self.table, count, None).await,
            None => self.asic_db.get_keys(&self.table).await,
        }
    }

    /// Waits until `expected` objects exist beyond the defaults.
    pub async fn verify_count(&self, expected: usize) -> DvsResult<Vec<String>> {
        self.asic_db
            .wait_for_n_keys(&self.table, self.default_ids.len() + expected, None)
            .await
    }

    /// Waits until object `id` carries every attribute in `qualifiers`.
    pub async fn verify_attrs(
        &self,
        id: &str,
        qualifiers: &SaiQualifiers,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        if qualifiers.is_empty() {
            return Err(DvsError::invalid_argument(
                "sai_qualifiers",
                "must name at least one attribute",
            ));
        }

        let expected = qualifiers_to_fields(qualifiers);
        self.asic_db
            .wait_for_entry_predicate(&self.table, id, &expected, polling, |observed| {
                qualifiers.iter().all(|(attr, want)| {
                    observed
                        .get(attr)
                        .is_some_and(|value| want.matches(value))
                })
            })
            .await
    }
}
