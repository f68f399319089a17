//! Polling waiter for eventually-consistent switch state.
//!
//! Orchagent, syncd and the fabric monitor publish their results to Redis
//! some time after a configuration change. Tests therefore never read once
//! and assert; they poll until the expected values show up or a deadline
//! passes.
//!
//! The loop is a two-state machine. It stays in [`WaitState::Waiting`] until
//! a qualifying match moves it to [`WaitState::Done`], or the deadline moves
//! it to [`WaitState::TimedOut`]. The first read happens before the first
//! sleep. In strict mode a match must be seen on two consecutive reads, which
//! filters out counters that flap while the system converges.

use crate::error::{DvsError, DvsResult};
use crate::store::{FieldValues, FieldValuesExt, KvStore};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default delay between reads.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(10);

/// Default total wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive matching reads required in strict mode.
pub const STRICT_CONFIRMATIONS: u32 = 2;

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    polling_interval: Duration,
    timeout: Duration,
    strict: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            strict: true,
        }
    }
}

impl PollingConfig {
    /// Creates a polling configuration. Validation happens when a wait starts.
    pub fn new(polling_interval: Duration, timeout: Duration, strict: bool) -> Self {
        Self {
            polling_interval,
            timeout,
            strict,
        }
    }

    /// Builds a configuration from fractional seconds, rejecting values that
    /// are not finite and positive.
    pub fn from_secs_f64(polling_interval: f64, timeout: f64, strict: bool) -> DvsResult<Self> {
        let config = Self::new(
            secs_to_duration("polling_interval", polling_interval)?,
            secs_to_duration("timeout", timeout)?,
            strict,
        );
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with a different strict flag.
    pub fn with_strict(self, strict: bool) -> Self {
        Self { strict, ..self }
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Consecutive matching reads needed before a wait succeeds.
    pub fn required_confirmations(&self) -> u32 {
        if self.strict {
            STRICT_CONFIRMATIONS
        } else {
            1
        }
    }

    /// Checks that interval and timeout are positive.
    ///
    /// An interval longer than the timeout is allowed; the wait then reads
    /// once at the start and once more at the deadline.
    pub fn validate(&self) -> DvsResult<()> {
        if self.polling_interval.is_zero() {
            return Err(DvsError::invalid_configuration(
                "polling_interval",
                "must be positive",
            ));
        }
        if self.timeout.is_zero() {
            return Err(DvsError::invalid_configuration("timeout", "must be positive"));
        }
        Ok(())
    }
}

fn secs_to_duration(field: &'static str, secs: f64) -> DvsResult<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(DvsError::invalid_configuration(
            field,
            format!("must be a positive number of seconds, got {}", secs),
        ));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| DvsError::invalid_configuration(field, e.to_string()))
}

/// States of a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Condition not yet satisfied, deadline not reached.
    Waiting,
    /// Condition satisfied with the required confirmations.
    Done,
    /// Deadline elapsed without a qualifying match.
    TimedOut,
}

/// Counts consecutive matching observations.
#[derive(Debug, Clone)]
pub struct ConfirmationTracker {
    required: u32,
    streak: u32,
}

impl ConfirmationTracker {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            streak: 0,
        }
    }

    /// Records one observation. A mismatch resets the streak.
    pub fn observe(&mut self, matched: bool) -> WaitState {
        if matched {
            self.streak += 1;
        } else {
            self.streak = 0;
        }

        if self.streak >= self.required {
            WaitState::Done
        } else {
            WaitState::Waiting
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Outcome of [`poll_until`].
#[derive(Debug, Clone)]
pub struct PollReport<T> {
    /// Either [`WaitState::Done`] or [`WaitState::TimedOut`].
    pub state: WaitState,
    /// Value produced by the final completed check, or `T::default()` if
    /// none completed.
    pub last: T,
    /// Number of checks performed.
    pub polls: u32,
    /// Time from the first check to the decision.
    pub elapsed: Duration,
}

impl<T> PollReport<T> {
    pub fn is_done(&self) -> bool {
        self.state == WaitState::Done
    }
}

/// Runs `check` until it reports a qualifying match or the timeout expires.
///
/// `check` returns whether the condition holds together with the value it
/// observed; the value of the final completed check is kept for diagnostics.
/// Each check only gets the time left before the deadline: one that has not
/// completed by then ends the wait as [`WaitState::TimedOut`]. An error from
/// `check` aborts the wait immediately.
pub async fn poll_until<T, F, Fut>(config: &PollingConfig, mut check: F) -> DvsResult<PollReport<T>>
where
    T: Default,
    F: FnMut() -> Fut,
    Fut: Future<Output = DvsResult<(bool, T)>>,
{
    config.validate()?;

    let start = Instant::now();
    let deadline = start + config.timeout();
    let mut tracker = ConfirmationTracker::new(config.required_confirmations());
    let mut polls = 0u32;
    let mut last: Option<T> = None;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::time::timeout(remaining, check()).await;
        polls += 1;

        let matched = match outcome {
            Ok(result) => {
                let (matched, observed) = result?;
                last = Some(observed);
                matched
            }
            Err(_) => {
                warn!(polls, "Read still pending at the deadline, giving up");
                return Ok(PollReport {
                    state: WaitState::TimedOut,
                    last: last.unwrap_or_default(),
                    polls,
                    elapsed: start.elapsed(),
                });
            }
        };

        let state = match tracker.observe(matched) {
            WaitState::Done => WaitState::Done,
            _ if Instant::now() >= deadline => WaitState::TimedOut,
            other => other,
        };

        if state != WaitState::Waiting {
            return Ok(PollReport {
                state,
                last: last.unwrap_or_default(),
                polls,
                elapsed: start.elapsed(),
            });
        }

        // Never sleep past the deadline; the last read lands on it.
        let pause = config
            .polling_interval()
            .min(deadline.saturating_duration_since(Instant::now()));
        debug!(
            polls,
            matched,
            streak = tracker.streak(),
            pause_ms = pause.as_millis() as u64,
            "Condition not yet satisfied, sleeping"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Waits until the listed fields of `table`/`key` hold the expected values.
///
/// Only fields named in `expected` are compared; other fields of the entry
/// are ignored. Retryable store errors (entry not found, dropped connection)
/// count as a mismatch. Returns the matching observation.
pub async fn wait_for_field_match<S>(
    store: &S,
    table: &str,
    key: &str,
    expected: &FieldValues,
    config: &PollingConfig,
) -> DvsResult<FieldValues>
where
    S: KvStore + ?Sized,
{
    if expected.is_empty() {
        return Err(DvsError::invalid_argument(
            "expected_fields",
            "must name at least one field",
        ));
    }
    wait_for_entry_condition(store, None, table, key, expected, config, |observed| {
        observed.contains_all(expected)
    })
    .await
}

/// Shared driver for the entry-shaped waits.
///
/// `label` prefixes the target in diagnostics so timeouts name the database.
/// `expected` is only reported; `predicate` decides.
pub(crate) async fn wait_for_entry_condition<S, P>(
    store: &S,
    label: Option<&str>,
    table: &str,
    key: &str,
    expected: &FieldValues,
    config: &PollingConfig,
    predicate: P,
) -> DvsResult<FieldValues>
where
    S: KvStore + ?Sized,
    P: Fn(&FieldValues) -> bool,
{
    if table.is_empty() {
        return Err(DvsError::invalid_argument("table", "must not be empty"));
    }
    if key.is_empty() {
        return Err(DvsError::invalid_argument("key", "must not be empty"));
    }

    let target = match label {
        Some(db) => format!("{} {}|{}", db, table, key),
        None => format!("{}|{}", table, key),
    };
    let predicate = &predicate;

    let report = poll_until(config, || async move {
        let observed = read_entry(store, table, key).await?;
        Ok((predicate(&observed), observed))
    })
    .await?;

    if report.is_done() {
        info!(
            entry = %target,
            polls = report.polls,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Entry reached expected state"
        );
        return Ok(report.last);
    }

    warn!(
        entry = %target,
        expected = ?expected,
        observed = ?report.last,
        polls = report.polls,
        "Timed out waiting for entry"
    );
    Err(DvsError::Timeout {
        target,
        expected: expected.clone(),
        observed: report.last,
        elapsed: report.elapsed,
        polls: report.polls,
    })
}

/// Reads an entry, mapping retryable store errors to an empty observation.
pub(crate) async fn read_entry<S>(store: &S, table: &str, key: &str) -> DvsResult<FieldValues>
where
    S: KvStore + ?Sized,
{
    match store.get_entry(table, key).await {
        Ok(fields) => Ok(fields),
        Err(e) if e.is_retryable() => {
            debug!(table, key, error = %e, "Treating store error as mismatch");
            Ok(FieldValues::new())
        }
        Err(e) => Err(e.into()),
    }
}
