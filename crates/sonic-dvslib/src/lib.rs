//! Virtual switch test library for SONiC
//!
//! Provides:
//! - Key-value accessors for the SONiC Redis databases (Redis and in-memory)
//! - A polling waiter for eventually-consistent table state
//! - Database handles with the common wait helpers
//! - SAI object verifiers for ECMP/LAG hash and switch attributes
//! - The fabric link isolation check
//! - Table-driven case runner and fixtures
//!
//! # Example
//!
//! ```ignore
//! use sonic_dvslib::{field_values, DbId, DvsDatabase, PollingConfig, RedisStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = RedisStore::connect("127.0.0.1", 6379, DbId::StateDb).await?;
//! let state_db = DvsDatabase::new(Arc::new(store), DbId::StateDb);
//!
//! let polling = PollingConfig::new(Duration::from_secs(60), Duration::from_secs(1200), true);
//! state_db
//!     .wait_for_field_match(
//!         "FABRIC_PORT_TABLE",
//!         "PORT1",
//!         &field_values! { "AUTO_ISOLATED" => "1" },
//!         Some(polling),
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod fabric;
pub mod fixtures;
pub mod hash;
pub mod polling;
mod redis_store;
pub mod runner;
pub mod sai;
pub mod store;
pub mod tables;

pub use config::DvsConfig;
pub use database::DvsDatabase;
pub use error::{DvsError, DvsResult, StoreError, StoreResult};
pub use fabric::{FabricCheckOutcome, FabricIsolationCheck, SkipReason};
pub use hash::{DvsHashManager, DvsSwitchManager, HashKind, HashObjects};
pub use polling::{poll_until, wait_for_field_match, PollReport, PollingConfig, WaitState};
pub use redis_store::RedisStore;
pub use runner::{run_cases, CaseFailure, CaseReport, TableCase};
pub use sai::{SaiAttr, SaiObjectTable, SaiQualifiers};
pub use store::{DbId, FieldValues, FieldValuesExt, InMemoryStore, KvStore};
