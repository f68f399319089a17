//! Test fixtures for the virtual switch databases
//!
//! Provides reusable table entries and case tables for hash and fabric tests

use crate::database::DvsDatabase;
use crate::error::DvsResult;
use crate::store::{DbId, FieldValues};

/// Table change operation type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOp {
    /// SET operation (add or update)
    Set,
    /// DEL operation (delete)
    Del,
}

/// A single table entry change
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Table name (e.g., "SWITCH_HASH", "FABRIC_PORT_TABLE")
    pub table: String,
    /// Key within the table
    pub key: String,
    /// Operation type
    pub op: ConfigOp,
    /// Field-value pairs (for SET operations)
    pub fields: FieldValues,
}

impl ConfigChange {
    /// Create a SET operation
    pub fn set(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: ConfigOp::Set,
            fields: FieldValues::new(),
        }
    }

    /// Create a DEL operation
    pub fn del(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            op: ConfigOp::Del,
            fields: FieldValues::new(),
        }
    }

    /// Add a field to a SET operation
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get the Redis key of this entry in `db`
    pub fn redis_key(&self, db: DbId) -> String {
        db.redis_key(&self.table, &self.key)
    }

    /// Apply the change to a database
    pub async fn apply(&self, db: &DvsDatabase) -> DvsResult<()> {
        match self.op {
            ConfigOp::Set => db.update_entry(&self.table, &self.key, &self.fields).await,
            ConfigOp::Del => db.delete_entry(&self.table, &self.key).await,
        }
    }
}

/// Fabric card fixtures
pub mod fabric_fixtures {
    use super::*;
    use crate::tables::{
        fields, CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY, STATE_FABRIC_PORT_TABLE_NAME,
    };

    /// DEVICE_METADATA|localhost with the given switch type
    pub fn device_metadata(switch_type: &str) -> ConfigChange {
        ConfigChange::set(CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY)
            .with_field(fields::SWITCH_TYPE, switch_type)
    }

    /// Fabric port as published by the link monitor, in product mode
    pub fn fabric_port_state(port: &str, status: &str) -> ConfigChange {
        ConfigChange::set(STATE_FABRIC_PORT_TABLE_NAME, port)
            .with_field(fields::STATUS, status)
            .with_field(fields::AUTO_ISOLATED, "0")
            .with_field(fields::TEST, "product")
    }
}

/// ECMP/LAG hash case tables
pub mod hash_fixtures {
    use super::*;
    use crate::hash::HashKind;
    use crate::runner::TableCase;
    use crate::sai::{SaiAttr, SaiQualifiers};
    use crate::tables::sai_attrs;

    /// Outer frame hash fields: (SWITCH_HASH name, SAI native hash field)
    pub const HASH_FIELDS: &[(&str, &str)] = &[
        ("DST_MAC", "SAI_NATIVE_HASH_FIELD_DST_MAC"),
        ("SRC_MAC", "SAI_NATIVE_HASH_FIELD_SRC_MAC"),
        ("ETHERTYPE", "SAI_NATIVE_HASH_FIELD_ETHERTYPE"),
        ("IP_PROTOCOL", "SAI_NATIVE_HASH_FIELD_IP_PROTOCOL"),
        ("DST_IP", "SAI_NATIVE_HASH_FIELD_DST_IP"),
        ("SRC_IP", "SAI_NATIVE_HASH_FIELD_SRC_IP"),
        ("L4_DST_PORT", "SAI_NATIVE_HASH_FIELD_L4_DST_PORT"),
        ("L4_SRC_PORT", "SAI_NATIVE_HASH_FIELD_L4_SRC_PORT"),
    ];

    /// Inner frame hash fields
    pub const INNER_HASH_FIELDS: &[(&str, &str)] = &[
        ("INNER_DST_MAC", "SAI_NATIVE_HASH_FIELD_INNER_DST_MAC"),
        ("INNER_SRC_MAC", "SAI_NATIVE_HASH_FIELD_INNER_SRC_MAC"),
        ("INNER_ETHERTYPE", "SAI_NATIVE_HASH_FIELD_INNER_ETHERTYPE"),
        ("INNER_IP_PROTOCOL", "SAI_NATIVE_HASH_FIELD_INNER_IP_PROTOCOL"),
        ("INNER_DST_IP", "SAI_NATIVE_HASH_FIELD_INNER_DST_IP"),
        ("INNER_SRC_IP", "SAI_NATIVE_HASH_FIELD_INNER_SRC_IP"),
        ("INNER_L4_DST_PORT", "SAI_NATIVE_HASH_FIELD_INNER_L4_DST_PORT"),
        ("INNER_L4_SRC_PORT", "SAI_NATIVE_HASH_FIELD_INNER_L4_SRC_PORT"),
    ];

    /// Hash fields a switch boots with
    pub const DEFAULT_HASH_FIELDS: &[(&str, &str)] = &[
        ("DST_MAC", "SAI_NATIVE_HASH_FIELD_DST_MAC"),
        ("SRC_MAC", "SAI_NATIVE_HASH_FIELD_SRC_MAC"),
        ("ETHERTYPE", "SAI_NATIVE_HASH_FIELD_ETHERTYPE"),
        ("IN_PORT", "SAI_NATIVE_HASH_FIELD_IN_PORT"),
    ];

    /// Hash algorithms: (SWITCH_HASH name, SAI hash algorithm)
    pub const HASH_ALGORITHMS: &[(&str, &str)] = &[
        ("CRC", "SAI_HASH_ALGORITHM_CRC"),
        ("XOR", "SAI_HASH_ALGORITHM_XOR"),
        ("RANDOM", "SAI_HASH_ALGORITHM_RANDOM"),
        ("CRC_32LO", "SAI_HASH_ALGORITHM_CRC_32LO"),
        ("CRC_32HI", "SAI_HASH_ALGORITHM_CRC_32HI"),
        ("CRC_CCITT", "SAI_HASH_ALGORITHM_CRC_CCITT"),
        ("CRC_XOR", "SAI_HASH_ALGORITHM_CRC_XOR"),
    ];

    /// Algorithm a switch boots with
    pub const DEFAULT_HASH_ALGORITHM: &str = "CRC";

    /// SWITCH_HASH update applied to one default hash
    #[derive(Debug, Clone)]
    pub struct SwitchHashInput {
        pub kind: HashKind,
        pub qualifiers: FieldValues,
    }

    /// Case mapping a SWITCH_HASH update to the SAI attributes it must produce
    pub type SwitchHashCase = TableCase<SwitchHashInput, SaiQualifiers>;

    fn config_list(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn field_list_case(id: String, kind: HashKind, pairs: &[(&str, &str)]) -> SwitchHashCase {
        let mut qualifiers = FieldValues::new();
        qualifiers.insert(kind.field_list_field().to_string(), config_list(pairs));

        let mut expected = SaiQualifiers::new();
        expected.insert(
            sai_attrs::HASH_NATIVE_HASH_FIELD_LIST.to_string(),
            SaiAttr::list(pairs.iter().map(|(_, sai)| *sai)),
        );

        TableCase::new(id, SwitchHashInput { kind, qualifiers }, expected)
    }

    fn algorithm_case(kind: HashKind, name: &str, sai: &str) -> SwitchHashCase {
        let mut qualifiers = FieldValues::new();
        qualifiers.insert(kind.algorithm_field().to_string(), name.to_string());

        let mut expected = SaiQualifiers::new();
        expected.insert(kind.sai_algorithm_attr().to_string(), SaiAttr::scalar(sai));

        TableCase::new(
            format!("{}-hash-algorithm-{}", kind.as_str(), name),
            SwitchHashInput { kind, qualifiers },
            expected,
        )
    }

    const KINDS: [HashKind; 2] = [HashKind::Ecmp, HashKind::Lag];

    /// Every hash crossed with outer and inner frame field lists
    pub fn hash_field_cases() -> Vec<SwitchHashCase> {
        let mut cases = Vec::new();
        for kind in KINDS {
            for (frame, pairs) in [("outer-frame", HASH_FIELDS), ("inner-frame", INNER_HASH_FIELDS)] {
                cases.push(field_list_case(
                    format!("{}-hash-{}", kind.as_str(), frame),
                    kind,
                    pairs,
                ));
            }
        }
        cases
    }

    /// Every hash restored to the default field list
    pub fn default_hash_field_cases() -> Vec<SwitchHashCase> {
        KINDS
            .iter()
            .map(|&kind| {
                field_list_case(
                    format!("{}-hash-default", kind.as_str()),
                    kind,
                    DEFAULT_HASH_FIELDS,
                )
            })
            .collect()
    }

    /// Every hash crossed with every algorithm
    pub fn hash_algorithm_cases() -> Vec<SwitchHashCase> {
        KINDS
            .iter()
            .flat_map(|&kind| {
                HASH_ALGORITHMS
                    .iter()
                    .map(move |(name, sai)| algorithm_case(kind, name, sai))
            })
            .collect()
    }

    /// Every hash restored to the default algorithm
    pub fn default_hash_algorithm_cases() -> Vec<SwitchHashCase> {
        let sai = HASH_ALGORITHMS
            .iter()
            .find(|(name, _)| *name == DEFAULT_HASH_ALGORITHM)
            .map(|(_, sai)| *sai)
            .unwrap_or("SAI_HASH_ALGORITHM_CRC");

        KINDS
            .iter()
            .map(|&kind| algorithm_case(kind, DEFAULT_HASH_ALGORITHM, sai))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::hash_fixtures::*;
    use super::*;
    use crate::hash::HashKind;
    use crate::sai::SaiAttr;
    use crate::store::FieldValuesExt;

    #[test]
    fn test_config_change_set() {
        let change = ConfigChange::set("SWITCH_HASH", "GLOBAL")
            .with_field("ecmp_hash", "DST_MAC,SRC_MAC")
            .with_field("lag_hash", "IN_PORT");

        assert_eq!(change.op, ConfigOp::Set);
        assert_eq!(change.table, "SWITCH_HASH");
        assert_eq!(change.key, "GLOBAL");
        assert_eq!(change.fields.len(), 2);
        assert_eq!(change.fields.get_field("ecmp_hash"), Some("DST_MAC,SRC_MAC"));
    }

    #[test]
    fn test_config_change_del() {
        let change = ConfigChange::del("FABRIC_PORT_TABLE", "PORT1");

        assert_eq!(change.op, ConfigOp::Del);
        assert!(change.fields.is_empty());
        assert_eq!(change.redis_key(DbId::StateDb), "FABRIC_PORT_TABLE|PORT1");
    }

    #[test]
    fn test_fabric_fixtures() {
        let meta = fabric_fixtures::device_metadata("fabric");
        assert_eq!(meta.redis_key(DbId::ConfigDb), "DEVICE_METADATA|localhost");
        assert_eq!(meta.fields.get_field("switch_type"), Some("fabric"));

        let port = fabric_fixtures::fabric_port_state("PORT7", "up");
        assert_eq!(port.fields.get_field("STATUS"), Some("up"));
        assert_eq!(port.fields.get_field("TEST"), Some("product"));
    }

    #[test]
    fn test_hash_field_cases() {
        let cases = hash_field_cases();
        let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ecmp-hash-outer-frame",
                "ecmp-hash-inner-frame",
                "lag-hash-outer-frame",
                "lag-hash-inner-frame",
            ]
        );

        let lag_inner = &cases[3];
        assert_eq!(lag_inner.input.kind, HashKind::Lag);
        assert!(lag_inner.input.qualifiers["lag_hash"].starts_with("INNER_DST_MAC,INNER_SRC_MAC"));
        match &lag_inner.expected["SAI_HASH_ATTR_NATIVE_HASH_FIELD_LIST"] {
            SaiAttr::List(items) => assert_eq!(items.len(), 8),
            other => panic!("unexpected attr: {other:?}"),
        }
    }

    #[test]
    fn test_hash_algorithm_cases() {
        let cases = hash_algorithm_cases();
        assert_eq!(cases.len(), 2 * HASH_ALGORITHMS.len());

        let case = cases
            .iter()
            .find(|c| c.id == "lag-hash-algorithm-CRC_32HI")
            .unwrap();
        assert_eq!(case.input.qualifiers["lag_hash_algorithm"], "CRC_32HI");
        assert_eq!(
            case.expected["SAI_SWITCH_ATTR_LAG_DEFAULT_HASH_ALGORITHM"],
            SaiAttr::scalar("SAI_HASH_ALGORITHM_CRC_32HI")
        );
    }

    #[test]
    fn test_default_cases() {
        assert_eq!(default_hash_field_cases().len(), 2);
        let defaults = default_hash_algorithm_cases();
        assert_eq!(defaults.len(), 2);
        assert_eq!(
            defaults[0].expected["SAI_SWITCH_ATTR_ECMP_DEFAULT_HASH_ALGORITHM"],
            SaiAttr::scalar("SAI_HASH_ALGORITHM_CRC")
        );
    }
}
