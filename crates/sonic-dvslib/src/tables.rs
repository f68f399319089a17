//! Table, key and attribute name constants used by the virtual switch tests

/// CONFIG_DB DEVICE_METADATA table
pub const CFG_DEVICE_METADATA_TABLE_NAME: &str = "DEVICE_METADATA";

/// Key of the local device in DEVICE_METADATA
pub const DEVICE_METADATA_KEY: &str = "localhost";

/// CONFIG_DB SWITCH_HASH table
pub const CFG_SWITCH_HASH_TABLE_NAME: &str = "SWITCH_HASH";

/// Only key of the SWITCH_HASH table
pub const SWITCH_HASH_KEY: &str = "GLOBAL";

/// STATE_DB FABRIC_PORT_TABLE
pub const STATE_FABRIC_PORT_TABLE_NAME: &str = "FABRIC_PORT_TABLE";

/// ASIC_DB table holding SAI objects, suffixed with the object type
pub const ASIC_STATE_TABLE_NAME: &str = "ASIC_STATE";

/// SAI object types inspected by the tests
pub mod sai_object_types {
    pub const HASH: &str = "SAI_OBJECT_TYPE_HASH";
    pub const SWITCH: &str = "SAI_OBJECT_TYPE_SWITCH";
}

/// SAI attribute names
pub mod sai_attrs {
    pub const HASH_NATIVE_HASH_FIELD_LIST: &str = "SAI_HASH_ATTR_NATIVE_HASH_FIELD_LIST";
    pub const SWITCH_ECMP_DEFAULT_HASH_ALGORITHM: &str =
        "SAI_SWITCH_ATTR_ECMP_DEFAULT_HASH_ALGORITHM";
    pub const SWITCH_LAG_DEFAULT_HASH_ALGORITHM: &str = "SAI_SWITCH_ATTR_LAG_DEFAULT_HASH_ALGORITHM";
}

/// Field names used in the tables above
pub mod fields {
    // DEVICE_METADATA
    pub const SWITCH_TYPE: &str = "switch_type";

    // SWITCH_HASH
    pub const ECMP_HASH: &str = "ecmp_hash";
    pub const LAG_HASH: &str = "lag_hash";
    pub const ECMP_HASH_ALGORITHM: &str = "ecmp_hash_algorithm";
    pub const LAG_HASH_ALGORITHM: &str = "lag_hash_algorithm";

    // FABRIC_PORT_TABLE
    pub const STATUS: &str = "STATUS";
    pub const SKIP_FEC_ERR_ON_LNKUP_CNT: &str = "SKIP_FEC_ERR_ON_LNKUP_CNT";
    pub const AUTO_ISOLATED: &str = "AUTO_ISOLATED";
    pub const TEST: &str = "TEST";
    pub const TEST_CRC_ERRORS: &str = "TEST_CRC_ERRORS";
    pub const TEST_CODE_ERRORS: &str = "TEST_CODE_ERRORS";
}

/// Builds the ASIC_DB table name of a SAI object type.
pub fn asic_state_table(object_type: &str) -> String {
    format!("{}:{}", ASIC_STATE_TABLE_NAME, object_type)
}
