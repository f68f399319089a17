//! dvs-wait - wait for a SONiC table entry to reach an expected state
//!
//! ```bash
//! dvs-wait --db state --table FABRIC_PORT_TABLE --key PORT1 \
//!     --field AUTO_ISOLATED=1 --interval-ms 60000 --timeout-ms 1200000 --strict true
//! ```

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use sonic_dvslib::{DbId, DvsConfig, DvsDatabase, FieldValues, RedisStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dvs-wait")]
#[command(about = "Wait until a SONiC database entry holds the expected fields", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = sonic_dvslib::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Redis host (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Redis port (overrides the configuration file)
    #[arg(long)]
    port: Option<u16>,

    /// Database holding the entry
    #[arg(long, value_enum, default_value = "state")]
    db: DbArg,

    /// Table name
    #[arg(long)]
    table: String,

    /// Entry key
    #[arg(long)]
    key: String,

    /// Expected field, as NAME=VALUE; repeat for several fields
    #[arg(long = "field", value_name = "NAME=VALUE", required = true, value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Delay between reads in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Total wait in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Require two consecutive matching reads; bare `--strict` means true
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    strict: Option<bool>,

    /// Print the matching entry as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DbArg {
    Appl,
    Asic,
    Counters,
    Config,
    State,
}

impl From<DbArg> for DbId {
    fn from(arg: DbArg) -> Self {
        match arg {
            DbArg::Appl => DbId::ApplDb,
            DbArg::Asic => DbId::AsicDb,
            DbArg::Counters => DbId::CountersDb,
            DbArg::Config => DbId::ConfigDb,
            DbArg::State => DbId::StateDb,
        }
    }
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

/// Initializes tracing; RUST_LOG overrides the default level
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

async fn run(args: Args) -> anyhow::Result<FieldValues> {
    let mut config = DvsConfig::load_or_default(&args.config)?;
    if let Some(host) = args.host {
        config.database.redis_host = host;
    }
    if let Some(port) = args.port {
        config.database.redis_port = port;
    }
    if let Some(interval) = args.interval_ms {
        config.polling.interval_ms = interval;
    }
    if let Some(timeout) = args.timeout_ms {
        config.polling.timeout_ms = timeout;
    }
    if let Some(strict) = args.strict {
        config.polling.strict = strict;
    }
    let polling = config.polling.to_polling_config()?;

    let db: DbId = args.db.into();
    let store = tokio::time::timeout(
        config.connection_timeout(),
        RedisStore::connect(&config.database.redis_host, config.database.redis_port, db),
    )
    .await
    .map_err(|_| {
        anyhow!(
            "Timed out connecting to {}:{}",
            config.database.redis_host,
            config.database.redis_port
        )
    })?
    .with_context(|| format!("Failed to connect to {}", db.name()))?;

    let expected: FieldValues = args.fields.into_iter().collect();
    let database = DvsDatabase::new(Arc::new(store), db).with_polling(polling);

    info!(
        db = database.db().name(),
        table = %args.table,
        key = %args.key,
        interval = ?polling.polling_interval(),
        timeout = ?polling.timeout(),
        strict = polling.strict(),
        "Waiting for entry"
    );

    let observed = database
        .wait_for_field_match(&args.table, &args.key, &expected, None)
        .await?;
    Ok(observed)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging() {
        eprintln!("dvs-wait: {:#}", e);
        return ExitCode::FAILURE;
    }

    let json = args.json;
    let started = std::time::Instant::now();
    match run(args).await {
        Ok(observed) => {
            if json {
                match serde_json::to_string_pretty(&observed) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        error!(error = %e, "Failed to render entry");
                        return ExitCode::FAILURE;
                    }
                }
            }
            info!(elapsed = ?started.elapsed(), "Entry matched");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
