//! Error types for dvslib operations.
//!
//! Two layers: [`StoreError`] is what a key-value accessor reports, and
//! [`DvsError`] is what callers of the waiters and managers see. Every wait
//! failure carries enough context to triage without re-running the test.

use crate::store::FieldValues;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dvslib operations.
pub type DvsResult<T> = Result<T, DvsError>;

/// Result type alias for key-value accessor operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a [`KvStore`](crate::store::KvStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested entry does not exist.
    #[error("Table entry not found: {table}|{key}")]
    EntryNotFound {
        /// The table name.
        table: String,
        /// The key.
        key: String,
    },

    /// Redis connection or command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store cannot serve requests at all.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates an entry not found error.
    pub fn entry_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::EntryNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may clear up on the next poll.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::EntryNotFound { .. } => true,
            StoreError::Redis(e) => {
                e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            StoreError::Unavailable(_) => false,
        }
    }
}

/// Errors that can occur while driving the virtual switch databases.
#[derive(Debug, Error)]
pub enum DvsError {
    /// A field wait expired without a qualifying match.
    #[error(
        "Timed out after {elapsed:?} ({polls} polls) waiting for {target}: \
         expected {expected:?}, last observed {observed:?}"
    )]
    Timeout {
        /// The observed entry, e.g. `STATE_DB FABRIC_PORT_TABLE|PORT1`.
        target: String,
        /// Fields the caller was waiting for.
        expected: FieldValues,
        /// Entry contents on the final read.
        observed: FieldValues,
        /// Time spent waiting.
        elapsed: Duration,
        /// Number of reads performed.
        polls: u32,
    },

    /// A non-field wait (key counts, deletions) expired.
    #[error("Timed out after {elapsed:?} ({polls} polls) waiting for {condition}: last observed {observed}")]
    ConditionTimeout {
        /// Human readable description of the awaited condition.
        condition: String,
        /// Rendering of the final observation.
        observed: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Number of reads performed.
        polls: u32,
    },

    /// Polling interval or timeout is not positive.
    #[error("Invalid polling configuration for {field}: {message}")]
    InvalidConfiguration {
        /// The offending setting.
        field: &'static str,
        /// Error message.
        message: String,
    },

    /// A wait or manager call was given an unusable argument.
    #[error("Invalid argument {argument}: {message}")]
    InvalidArgument {
        /// The offending argument.
        argument: &'static str,
        /// Error message.
        message: String,
    },

    /// ASIC_DB does not hold the number of objects the caller relies on.
    #[error("Expected {expected} {object_type} objects, found {actual}")]
    ObjectCount {
        /// SAI object type, e.g. `SAI_OBJECT_TYPE_HASH`.
        object_type: String,
        /// Number of objects required.
        expected: usize,
        /// Number of objects present.
        actual: usize,
    },

    /// One or more table-driven cases failed.
    #[error("{} of {total} cases failed: {}", .failed.len(), .failed.join("; "))]
    CasesFailed {
        /// `<case id>: <error>` for every failed case.
        failed: Vec<String>,
        /// Number of cases run.
        total: usize,
    },

    /// Non-recoverable fault from the underlying store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DvsError {
    /// Creates an invalid configuration error.
    pub fn invalid_configuration(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            message: message.into(),
        }
    }

    /// Returns true for either flavour of wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DvsError::Timeout { .. } | DvsError::ConditionTimeout { .. }
        )
    }
}
