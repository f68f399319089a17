//! Fabric link isolation check for VOQ fabric cards.
//!
//! The fabric link monitor isolates a fabric port after it sees errors on
//! consecutive polls and brings it back once the errors stay clear. In test
//! mode (`TEST=TEST` in STATE_DB) it reads injected error counters from
//! `TEST_CRC_ERRORS`/`TEST_CODE_ERRORS` instead of the hardware counters.
//! [`FabricIsolationCheck`] injects errors, waits for `AUTO_ISOLATED` to
//! follow, and always puts the port back into product mode.

use crate::database::DvsDatabase;
use crate::error::DvsResult;
use crate::field_values;
use crate::polling::PollingConfig;
use crate::store::FieldValuesExt;
use crate::tables::{
    fields, CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY, STATE_FABRIC_PORT_TABLE_NAME,
};
use rand::Rng;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Number of fabric ports on the virtual fabric card.
pub const FABRIC_PORT_COUNT: u32 = 16;

/// Init polls the monitor skips after link up before counting errors.
pub const SKIP_FEC_ERR_ON_LNKUP_POLLS: &str = "2";

/// The monitor polls slowly; isolation takes several of its cycles.
pub const FABRIC_POLLING_INTERVAL: Duration = Duration::from_secs(60);
pub const FABRIC_TIMEOUT: Duration = Duration::from_secs(1200);

/// Why a check did not exercise the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is not a fabric card.
    NotFabric { switch_type: Option<String> },
    /// The chosen fabric link is not up.
    LinkDown { status: Option<String> },
}

/// Result of a completed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FabricCheckOutcome {
    /// The port isolated on injected errors and recovered after clearing them.
    Passed { port: String },
    /// Nothing to test on this device or port.
    Skipped { port: String, reason: SkipReason },
}

/// Runs the isolate/unisolate cycle on one fabric port.
#[derive(Debug, Clone)]
pub struct FabricIsolationCheck {
    config_db: DvsDatabase,
    state_db: DvsDatabase,
    polling: PollingConfig,
}

impl FabricIsolationCheck {
    pub fn new(config_db: DvsDatabase, state_db: DvsDatabase) -> Self {
        Self {
            config_db,
            state_db,
            polling: PollingConfig::new(FABRIC_POLLING_INTERVAL, FABRIC_TIMEOUT, true),
        }
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Picks one of `PORT1..=PORT16` at random.
    pub fn random_port() -> String {
        let index = rand::thread_rng().gen_range(1..=FABRIC_PORT_COUNT);
        format!("PORT{}", index)
    }

    /// Runs the check on `port`.
    ///
    /// Test-mode fields are restored even if a wait fails. When both the
    /// check and the restore fail, the check's error is returned.
    #[instrument(skip(self))]
    pub async fn run(&self, port: &str) -> DvsResult<FabricCheckOutcome> {
        let metadata = self
            .config_db
            .get_entry(CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY)
            .await?;
        let switch_type = metadata.get_field(fields::SWITCH_TYPE);
        if switch_type != Some("fabric") {
            info!(?switch_type, "Not a fabric card, skipping");
            return Ok(FabricCheckOutcome::Skipped {
                port: port.to_string(),
                reason: SkipReason::NotFabric {
                    switch_type: switch_type.map(str::to_string),
                },
            });
        }

        let port_state = self
            .state_db
            .get_entry(STATE_FABRIC_PORT_TABLE_NAME, port)
            .await?;
        let status = port_state.get_field(fields::STATUS);
        if status != Some("up") {
            info!(?status, "Fabric link is down, skipping");
            return Ok(FabricCheckOutcome::Skipped {
                port: port.to_string(),
                reason: SkipReason::LinkDown {
                    status: status.map(str::to_string),
                },
            });
        }

        self.wait_port(port, fields::SKIP_FEC_ERR_ON_LNKUP_CNT, SKIP_FEC_ERR_ON_LNKUP_POLLS)
            .await?;

        let result = self.exercise(port).await;
        let restored = self.restore(port).await;

        match (result, restored) {
            (Ok(()), Ok(())) => Ok(FabricCheckOutcome::Passed {
                port: port.to_string(),
            }),
            (Err(e), restored) => {
                if let Err(restore_err) = restored {
                    error!(error = %restore_err, "Failed to restore fabric port after failed check");
                }
                Err(e)
            }
            (Ok(()), Err(restore_err)) => Err(restore_err),
        }
    }

    async fn exercise(&self, port: &str) -> DvsResult<()> {
        self.set_port(port, fields::TEST_CRC_ERRORS, "0").await?;
        self.set_port(port, fields::TEST_CODE_ERRORS, "0").await?;
        self.set_port(port, fields::TEST, "TEST").await?;

        info!(port, "Injecting CRC errors");
        self.set_port(port, fields::TEST_CRC_ERRORS, "2").await?;
        self.wait_port(port, fields::AUTO_ISOLATED, "1").await?;

        info!(port, "Clearing CRC errors");
        self.set_port(port, fields::TEST_CRC_ERRORS, "0").await?;
        self.wait_port(port, fields::AUTO_ISOLATED, "0").await?;
        Ok(())
    }

    async fn restore(&self, port: &str) -> DvsResult<()> {
        let mut result = Ok(());
        for (field, value) in [
            (fields::TEST_CRC_ERRORS, "0"),
            (fields::TEST_CODE_ERRORS, "0"),
            (fields::TEST, "product"),
        ] {
            if let Err(e) = self.set_port(port, field, value).await {
                warn!(port, field, error = %e, "Failed to restore fabric port field");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    async fn set_port(&self, port: &str, field: &str, value: &str) -> DvsResult<()> {
        self.state_db
            .update_entry(STATE_FABRIC_PORT_TABLE_NAME, port, &field_values! { field => value })
            .await
    }

    async fn wait_port(&self, port: &str, field: &str, value: &str) -> DvsResult<()> {
        self.state_db
            .wait_for_field_match(
                STATE_FABRIC_PORT_TABLE_NAME,
                port,
                &field_values! { field => value },
                Some(self.polling),
            )
            .await
            .map(|_| ())
    }
}
