use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use almon_engine::PollCycle;
use almon_notify::gateway::SmsGatewayClient;
use almon_source::client::EdsClient;
use almon_storage::sqlite::SqliteAlarmStore;

use almon_server::admin;
use almon_server::config::{self, ServerConfig};
use almon_server::poll::PollScheduler;
use almon_server::seed;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  almon-server [config.toml]                                Start the monitor");
    eprintln!("  almon-server clear-alarms <config.toml>                   Clear all alarms and re-scan the last 24h");
    eprintln!("  almon-server init-credentials <config.toml> <seed.json>   Store eds/sms credentials from seed file");
    eprintln!("  almon-server init-contacts <config.toml> <seed.json>      Add notification contacts from seed file");
    eprintln!("  almon-server status <config.toml>                         Probe collaborators and list recent alarms");
}

#[tokio::main]
async fn main() -> Result<()> {
    almon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("almon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("clear-alarms") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("clear-alarms requires a <config.toml> argument")
            })?;
            run_clear_alarms(config_path).await
        }
        Some("init-credentials") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-credentials requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-credentials requires a <seed.json> argument")
            })?;
            run_init_credentials(config_path, seed_path)
        }
        Some("init-contacts") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-contacts requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-contacts requires a <seed.json> argument")
            })?;
            run_init_contacts(config_path, seed_path)
        }
        Some("status") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("status requires a <config.toml> argument")
            })?;
            run_status(config_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn build_cycle(config: &ServerConfig, store: Arc<SqliteAlarmStore>) -> PollCycle {
    let source = Arc::new(EdsClient::new(
        config.source.probe_timeout_secs,
        config.source.fetch_timeout_secs,
    ));
    let sender = Arc::new(SmsGatewayClient::new());
    PollCycle::new(store, source, sender, config.system_alarm.cooldown_secs)
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;

    tracing::info!(
        db = %config.database.path,
        interval_secs = config.poll.interval_secs,
        "almon-server starting"
    );

    let store = Arc::new(SqliteAlarmStore::open(Path::new(&config.database.path))?);
    let cycle = build_cycle(&config, store.clone());
    let scheduler = PollScheduler::new(
        cycle,
        config.poll.interval_secs,
        config.poll.misfire_grace_secs,
    );

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    scheduler_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}

/// Clear every alarm, drop synthetic rows, and force a 24h re-scan.
async fn run_clear_alarms(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = Arc::new(SqliteAlarmStore::open(Path::new(&config.database.path))?);
    let cycle = build_cycle(&config, store.clone());
    admin::clear_alarms(store.as_ref(), &cycle).await
}

/// Store eds/sms credentials from a JSON seed file.
fn run_init_credentials(config_path: &str, seed_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = SqliteAlarmStore::open(Path::new(&config.database.path))?;
    seed::init_credentials(&store, seed_path)
}

/// Add notification contacts from a JSON seed file.
fn run_init_contacts(config_path: &str, seed_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = SqliteAlarmStore::open(Path::new(&config.database.path))?;
    seed::init_contacts(&store, seed_path)
}

/// Probe both collaborators and print recent alarms.
async fn run_status(config_path: &str) -> Result<()> {
    let config = config::ServerConfig::load(config_path)?;
    let store = SqliteAlarmStore::open(Path::new(&config.database.path))?;
    let source = EdsClient::new(
        config.source.probe_timeout_secs,
        config.source.fetch_timeout_secs,
    );
    let sender = SmsGatewayClient::new();
    admin::status(&store, &source, &sender).await
}
