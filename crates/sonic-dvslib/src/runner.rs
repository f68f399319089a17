//! Table-driven test cases.
//!
//! A test declares its cases as data, `(id, input, expected)`, and hands them
//! to [`run_cases`] together with one async runner. Every case runs even if
//! an earlier one fails, and the report names each failure by id.

use crate::error::{DvsError, DvsResult};
use std::future::Future;
use tracing::{error, info};

/// One row of a case table.
#[derive(Debug, Clone)]
pub struct TableCase<I, O> {
    /// Identifier used in logs and failure reports, e.g. `ecmp-hash-outer-frame`.
    pub id: String,
    pub input: I,
    pub expected: O,
}

impl<I, O> TableCase<I, O> {
    pub fn new(id: impl Into<String>, input: I, expected: O) -> Self {
        Self {
            id: id.into(),
            input,
            expected,
        }
    }
}

/// A failed case.
#[derive(Debug)]
pub struct CaseFailure {
    pub id: String,
    pub error: DvsError,
}

/// Outcome of a case table run.
#[derive(Debug, Default)]
pub struct CaseReport {
    pub passed: Vec<String>,
    pub failures: Vec<CaseFailure>,
}

impl CaseReport {
    pub fn total(&self) -> usize {
        self.passed.len() + self.failures.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapses the report into a single error listing every failed case.
    pub fn into_result(self) -> DvsResult<()> {
        if self.failures.is_empty() {
            return Ok(());
        }

        let total = self.total();
        Err(DvsError::CasesFailed {
            failed: self
                .failures
                .into_iter()
                .map(|f| format!("{}: {}", f.id, f.error))
                .collect(),
            total,
        })
    }
}

/// Runs `runner` on every case in order.
pub async fn run_cases<I, O, C, F, Fut>(cases: C, mut runner: F) -> CaseReport
where
    C: IntoIterator<Item = TableCase<I, O>>,
    F: FnMut(TableCase<I, O>) -> Fut,
    Fut: Future<Output = DvsResult<()>>,
{
    let mut report = CaseReport::default();

    for case in cases {
        let id = case.id.clone();
        info!(case = %id, "Running case");

        match runner(case).await {
            Ok(()) => report.passed.push(id),
            Err(e) => {
                error!(case = %id, error = %e, "Case failed");
                report.failures.push(CaseFailure { id, error: e });
            }
        }
    }

    report
}
