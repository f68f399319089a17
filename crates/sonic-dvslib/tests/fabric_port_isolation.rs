//! Fabric link isolation against a simulated link monitor
//!
//! The monitor task below mimics the fabric monitor daemon: it counts the
//! init polls after link up, and in test mode isolates a port after
//! consecutive polls with injected CRC errors and unisolates it once they
//! clear. Time is paused, so the 1s monitor tick costs nothing.

use pretty_assertions::assert_eq;
use sonic_dvslib::fixtures::fabric_fixtures::{device_metadata, fabric_port_state};
use sonic_dvslib::fixtures::ConfigChange;
use sonic_dvslib::tables::{
    fields, CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY, STATE_FABRIC_PORT_TABLE_NAME,
};
use sonic_dvslib::{
    DbId, DvsDatabase, DvsError, FabricCheckOutcome, FabricIsolationCheck, FieldValuesExt,
    InMemoryStore, KvStore, PollingConfig, SkipReason,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MONITOR_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct MonitorBehaviour {
    /// Polls with errors before isolating; `None` never isolates.
    isolate_after: Option<u32>,
    /// Clean polls before unisolating.
    recover_after: u32,
}

impl Default for MonitorBehaviour {
    fn default() -> Self {
        Self {
            isolate_after: Some(2),
            recover_after: 2,
        }
    }
}

#[derive(Debug, Default)]
struct PortCounters {
    init_polls: u32,
    error_polls: u32,
    clean_polls: u32,
}

fn spawn_fabric_monitor(store: InMemoryStore, behaviour: MonitorBehaviour) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut counters: HashMap<String, PortCounters> = HashMap::new();
        loop {
            let ports = store.get_keys(STATE_FABRIC_PORT_TABLE_NAME).await.unwrap();
            for port in ports {
                let state = store
                    .get_entry(STATE_FABRIC_PORT_TABLE_NAME, &port)
                    .await
                    .unwrap();
                if state.get_field(fields::STATUS) != Some("up") {
                    continue;
                }

                let c = counters.entry(port.clone()).or_default();
                let mut update = sonic_dvslib::FieldValues::new();

                if c.init_polls < 2 {
                    c.init_polls += 1;
                    update.insert(
                        fields::SKIP_FEC_ERR_ON_LNKUP_CNT.to_string(),
                        c.init_polls.to_string(),
                    );
                } else if state.get_field(fields::TEST) == Some("TEST") {
                    let crc: u64 = state
                        .get_field_or(fields::TEST_CRC_ERRORS, "0")
                        .parse()
                        .unwrap_or(0);
                    if crc > 0 {
                        c.error_polls += 1;
                        c.clean_polls = 0;
                        if behaviour.isolate_after.is_some_and(|n| c.error_polls >= n) {
                            update.insert(fields::AUTO_ISOLATED.to_string(), "1".to_string());
                        }
                    } else {
                        c.clean_polls += 1;
                        c.error_polls = 0;
                        if c.clean_polls >= behaviour.recover_after {
                            update.insert(fields::AUTO_ISOLATED.to_string(), "0".to_string());
                        }
                    }
                }

                if !update.is_empty() {
                    store
                        .update_entry(STATE_FABRIC_PORT_TABLE_NAME, &port, &update)
                        .await
                        .unwrap();
                }
            }
            tokio::time::sleep(MONITOR_TICK).await;
        }
    })
}

struct FabricCard {
    store: InMemoryStore,
    config_db: DvsDatabase,
    state_db: DvsDatabase,
}

impl FabricCard {
    async fn new(switch_type: Option<&str>, ports: &[(&str, &str)]) -> Self {
        let store = InMemoryStore::new();
        let shared: Arc<dyn KvStore> = Arc::new(store.clone());
        let config_db = DvsDatabase::new(shared.clone(), DbId::ConfigDb);
        let state_db = DvsDatabase::new(shared, DbId::StateDb);

        if let Some(switch_type) = switch_type {
            device_metadata(switch_type).apply(&config_db).await.unwrap();
        }
        for (port, status) in ports {
            fabric_port_state(port, status).apply(&state_db).await.unwrap();
        }

        Self {
            store,
            config_db,
            state_db,
        }
    }

    fn check(&self) -> FabricIsolationCheck {
        FabricIsolationCheck::new(self.config_db.clone(), self.state_db.clone()).with_polling(
            PollingConfig::new(Duration::from_secs(1), Duration::from_secs(60), true),
        )
    }

    fn port(&self, port: &str) -> sonic_dvslib::FieldValues {
        self.store.snapshot(STATE_FABRIC_PORT_TABLE_NAME, port)
    }
}

fn all_ports_up() -> Vec<(String, &'static str)> {
    (1..=16).map(|i| (format!("PORT{}", i), "up")).collect()
}

#[tokio::test(start_paused = true)]
async fn test_port_isolates_and_recovers() {
    let card = FabricCard::new(Some("fabric"), &[("PORT3", "up")]).await;
    let monitor = spawn_fabric_monitor(card.store.clone(), MonitorBehaviour::default());

    let outcome = card.check().run("PORT3").await.expect("check should pass");
    monitor.abort();

    assert_eq!(
        outcome,
        FabricCheckOutcome::Passed {
            port: "PORT3".to_string()
        }
    );

    let port = card.port("PORT3");
    assert_eq!(port.get_field(fields::TEST), Some("product"));
    assert_eq!(port.get_field(fields::TEST_CRC_ERRORS), Some("0"));
    assert_eq!(port.get_field(fields::TEST_CODE_ERRORS), Some("0"));
    assert_eq!(port.get_field(fields::AUTO_ISOLATED), Some("0"));
    assert_eq!(port.get_field(fields::SKIP_FEC_ERR_ON_LNKUP_CNT), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn test_random_port_on_full_card() {
    let ports = all_ports_up();
    let port_refs: Vec<(&str, &str)> = ports.iter().map(|(p, s)| (p.as_str(), *s)).collect();
    let card = FabricCard::new(Some("fabric"), &port_refs).await;
    let monitor = spawn_fabric_monitor(card.store.clone(), MonitorBehaviour::default());

    let port = FabricIsolationCheck::random_port();
    let outcome = card.check().run(&port).await.unwrap();
    monitor.abort();

    assert_eq!(outcome, FabricCheckOutcome::Passed { port: port.clone() });
    assert_eq!(card.port(&port).get_field(fields::TEST), Some("product"));
}

#[tokio::test(start_paused = true)]
async fn test_non_fabric_switch_is_skipped() {
    let card = FabricCard::new(Some("voq"), &[("PORT1", "up")]).await;
    let before = card.port("PORT1");
    let writes = card.store.write_count();

    let outcome = card.check().run("PORT1").await.unwrap();

    assert_eq!(
        outcome,
        FabricCheckOutcome::Skipped {
            port: "PORT1".to_string(),
            reason: SkipReason::NotFabric {
                switch_type: Some("voq".to_string())
            },
        }
    );
    assert_eq!(card.port("PORT1"), before);
    assert_eq!(card.store.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_missing_device_metadata_is_skipped() {
    let card = FabricCard::new(None, &[("PORT1", "up")]).await;

    let outcome = card.check().run("PORT1").await.unwrap();
    assert_eq!(
        outcome,
        FabricCheckOutcome::Skipped {
            port: "PORT1".to_string(),
            reason: SkipReason::NotFabric { switch_type: None },
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_link_down_is_skipped() {
    let card = FabricCard::new(Some("fabric"), &[("PORT5", "down")]).await;
    let writes = card.store.write_count();

    let outcome = card.check().run("PORT5").await.unwrap();

    assert_eq!(
        outcome,
        FabricCheckOutcome::Skipped {
            port: "PORT5".to_string(),
            reason: SkipReason::LinkDown {
                status: Some("down".to_string())
            },
        }
    );
    assert_eq!(card.store.write_count(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_port_restored_when_isolation_never_happens() {
    let card = FabricCard::new(Some("fabric"), &[("PORT9", "up")]).await;
    let monitor = spawn_fabric_monitor(
        card.store.clone(),
        MonitorBehaviour {
            isolate_after: None,
            ..MonitorBehaviour::default()
        },
    );

    let err = card.check().run("PORT9").await.unwrap_err();
    monitor.abort();

    match err {
        DvsError::Timeout {
            target, expected, ..
        } => {
            assert_eq!(target, "STATE_DB FABRIC_PORT_TABLE|PORT9");
            assert_eq!(expected.get_field(fields::AUTO_ISOLATED), Some("1"));
        }
        other => panic!("expected Timeout, got {other}"),
    }

    let port = card.port("PORT9");
    assert_eq!(port.get_field(fields::TEST), Some("product"));
    assert_eq!(port.get_field(fields::TEST_CRC_ERRORS), Some("0"));
    assert_eq!(port.get_field(fields::AUTO_ISOLATED), Some("0"));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_init_polls_fail_before_test_mode() {
    // No monitor: SKIP_FEC_ERR_ON_LNKUP_CNT never reaches 2
    let card = FabricCard::new(Some("fabric"), &[("PORT2", "up")]).await;
    let writes = card.store.write_count();

    let err = card.check().run("PORT2").await.unwrap_err();

    match err {
        DvsError::Timeout { expected, .. } => {
            assert_eq!(
                expected.get_field(fields::SKIP_FEC_ERR_ON_LNKUP_CNT),
                Some("2")
            );
        }
        other => panic!("expected Timeout, got {other}"),
    }
    assert_eq!(card.store.write_count(), writes);
    assert_eq!(card.port("PORT2").get_field(fields::TEST), Some("product"));
}

#[tokio::test(start_paused = true)]
async fn test_chassis_checks_every_card() {
    let linecard = FabricCard::new(Some("voq"), &[("PORT1", "up")]).await;
    let fabric = FabricCard::new(Some("fabric"), &[("PORT1", "up")]).await;
    let unprovisioned = FabricCard::new(Some("fabric"), &[("PORT1", "up")]).await;
    ConfigChange::del(CFG_DEVICE_METADATA_TABLE_NAME, DEVICE_METADATA_KEY)
        .apply(&unprovisioned.config_db)
        .await
        .unwrap();

    let chassis = [
        ("lc0", &linecard),
        ("fc0", &fabric),
        ("fc1", &unprovisioned),
    ];
    let monitors: Vec<JoinHandle<()>> = chassis
        .iter()
        .map(|(_, card)| spawn_fabric_monitor(card.store.clone(), MonitorBehaviour::default()))
        .collect();

    let mut outcomes = BTreeMap::new();
    for (name, card) in &chassis {
        let outcome = card.check().run("PORT1").await.unwrap();
        outcomes.insert(*name, outcome);
    }
    for monitor in monitors {
        monitor.abort();
    }

    let port = || "PORT1".to_string();
    assert_eq!(
        outcomes,
        BTreeMap::from([
            (
                "fc0",
                FabricCheckOutcome::Passed { port: port() }
            ),
            (
                "fc1",
                FabricCheckOutcome::Skipped {
                    port: port(),
                    reason: SkipReason::NotFabric { switch_type: None },
                }
            ),
            (
                "lc0",
                FabricCheckOutcome::Skipped {
                    port: port(),
                    reason: SkipReason::NotFabric {
                        switch_type: Some("voq".to_string())
                    },
                }
            ),
        ])
    );

    for card in [&linecard, &fabric, &unprovisioned] {
        assert_eq!(card.port("PORT1").get_field(fields::TEST), Some("product"));
    }
}
