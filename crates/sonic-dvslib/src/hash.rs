//! ECMP/LAG hash and switch object managers.
//!
//! Hash configuration is written to CONFIG_DB `SWITCH_HASH|GLOBAL`; the
//! switch under test programs SAI hash objects (field lists) and switch
//! attributes (algorithms), which these managers then observe in ASIC_DB.

use crate::database::DvsDatabase;
use crate::error::{DvsError, DvsResult};
use crate::polling::PollingConfig;
use crate::sai::{SaiObjectTable, SaiQualifiers};
use crate::store::FieldValues;
use crate::tables::{fields, sai_attrs, sai_object_types, CFG_SWITCH_HASH_TABLE_NAME, SWITCH_HASH_KEY};
use tracing::info;

/// Which default hash a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Ecmp,
    Lag,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Ecmp => "ecmp",
            HashKind::Lag => "lag",
        }
    }

    /// SWITCH_HASH field holding the hash field list.
    pub fn field_list_field(&self) -> &'static str {
        match self {
            HashKind::Ecmp => fields::ECMP_HASH,
            HashKind::Lag => fields::LAG_HASH,
        }
    }

    /// SWITCH_HASH field holding the hash algorithm.
    pub fn algorithm_field(&self) -> &'static str {
        match self {
            HashKind::Ecmp => fields::ECMP_HASH_ALGORITHM,
            HashKind::Lag => fields::LAG_HASH_ALGORITHM,
        }
    }

    /// SAI switch attribute carrying the default algorithm.
    pub fn sai_algorithm_attr(&self) -> &'static str {
        match self {
            HashKind::Ecmp => sai_attrs::SWITCH_ECMP_DEFAULT_HASH_ALGORITHM,
            HashKind::Lag => sai_attrs::SWITCH_LAG_DEFAULT_HASH_ALGORITHM,
        }
    }
}

/// The two default hash objects of a switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashObjects {
    pub ecmp: String,
    pub lag: String,
}

impl HashObjects {
    pub fn id(&self, kind: HashKind) -> &str {
        match kind {
            HashKind::Ecmp => &self.ecmp,
            HashKind::Lag => &self.lag,
        }
    }
}

/// Drives SWITCH_HASH configuration and checks the resulting SAI hashes.
#[derive(Debug, Clone)]
pub struct DvsHashManager {
    config_db: DvsDatabase,
    hashes: SaiObjectTable,
}

impl DvsHashManager {
    pub async fn new(config_db: DvsDatabase, asic_db: DvsDatabase) -> DvsResult<Self> {
        let hashes = SaiObjectTable::new(asic_db, sai_object_types::HASH).await?;
        Ok(Self { config_db, hashes })
    }

    /// Merges `qualifiers` into `SWITCH_HASH|GLOBAL`.
    pub async fn update_switch_hash(&self, qualifiers: &FieldValues) -> DvsResult<()> {
        if qualifiers.is_empty() {
            return Err(DvsError::invalid_argument(
                "qualifiers",
                "must set at least one SWITCH_HASH field",
            ));
        }

        info!(?qualifiers, "Updating switch hash");
        self.config_db
            .update_entry(CFG_SWITCH_HASH_TABLE_NAME, SWITCH_HASH_KEY, qualifiers)
            .await
    }

    /// Waits until `expected` hash objects exist beyond the defaults.
    pub async fn verify_hash_count(&self, expected: usize) -> DvsResult<Vec<String>> {
        self.hashes.verify_count(expected).await
    }

    pub async fn get_hash_ids(&self, expected: Option<usize>) -> DvsResult<Vec<String>> {
        self.hashes.get_ids(expected).await
    }

    /// Identifies the ECMP and LAG hash objects.
    ///
    /// The virtual switch creates exactly two hash objects at boot, ECMP
    /// first, so their sorted ids map in that order.
    pub async fn hash_objects(&self) -> DvsResult<HashObjects> {
        let ids = self.get_hash_ids(None).await?;
        match ids.as_slice() {
            [ecmp, lag] => Ok(HashObjects {
                ecmp: ecmp.clone(),
                lag: lag.clone(),
            }),
            _ => Err(DvsError::ObjectCount {
                object_type: self.hashes.object_type().to_string(),
                expected: 2,
                actual: ids.len(),
            }),
        }
    }

    /// Waits until hash object `sai_hash_id` carries `sai_qualifiers`.
    pub async fn verify_hash_generic(
        &self,
        sai_hash_id: &str,
        sai_qualifiers: &SaiQualifiers,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        self.hashes
            .verify_attrs(sai_hash_id, sai_qualifiers, polling)
            .await
    }
}

/// Checks SAI switch object attributes.
#[derive(Debug, Clone)]
pub struct DvsSwitchManager {
    switches: SaiObjectTable,
}

impl DvsSwitchManager {
    pub async fn new(asic_db: DvsDatabase) -> DvsResult<Self> {
        let switches = SaiObjectTable::new(asic_db, sai_object_types::SWITCH).await?;
        Ok(Self { switches })
    }

    /// Waits until `expected` switch objects exist beyond the defaults.
    pub async fn verify_switch_count(&self, expected: usize) -> DvsResult<Vec<String>> {
        self.switches.verify_count(expected).await
    }

    pub async fn get_switch_ids(&self, expected: Option<usize>) -> DvsResult<Vec<String>> {
        self.switches.get_ids(expected).await
    }

    /// The single switch object of the virtual switch.
    pub async fn switch_id(&self) -> DvsResult<String> {
        let ids = self.get_switch_ids(None).await?;
        match ids.as_slice() {
            [id] => Ok(id.clone()),
            _ => Err(DvsError::ObjectCount {
                object_type: self.switches.object_type().to_string(),
                expected: 1,
                actual: ids.len(),
            }),
        }
    }

    /// Waits until switch `sai_switch_id` carries `sai_qualifiers`.
    pub async fn verify_switch(
        &self,
        sai_switch_id: &str,
        sai_qualifiers: &SaiQualifiers,
        polling: Option<PollingConfig>,
    ) -> DvsResult<FieldValues> {
        self.switches
            .verify_attrs(sai_switch_id, sai_qualifiers, polling)
            .await
    }
}
