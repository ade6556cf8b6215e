use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use portvakt_config::PortvaktConfig;
use portvakt_engine::BanController;
use portvakt_firewall::{IptablesBackend, RuleSync, SetNames};
use portvakt_store::BanStore;
use portvakt_telemetry::{EventLogger, MetricsRecorder};

type CliError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "portvakt", version, about)]
pub struct Cli {
    /// Configuration file; without it, config/portvakt.yaml is used when
    /// present and built-in defaults otherwise.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon (live capture, bans enforced until shutdown)
    Run(RunArgs),
    /// Remove leftover firewall sets and chain from a previous run
    Teardown,
    /// Print the persisted ban records
    List,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Capture interface override.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Log ban decisions without touching the firewall or the store.
    #[arg(long)]
    pub view: bool,
}

fn load_config(path: Option<PathBuf>) -> Result<PortvaktConfig, CliError> {
    Ok(match path {
        Some(path) => PortvaktConfig::load_from_path(path)?,
        None => PortvaktConfig::load()?,
    })
}

fn set_names(config: &PortvaktConfig) -> SetNames {
    SetNames {
        blacklist: config.firewall.blacklist_set.clone(),
        whitelist: config.firewall.whitelist_set.clone(),
        chain: config.firewall.chain.clone(),
    }
}

fn backend(config: &PortvaktConfig) -> Result<IptablesBackend, CliError> {
    Ok(IptablesBackend::new(
        config.firewall.max_elements,
        Duration::from_millis(config.firewall.command_timeout_ms),
    )?)
}

pub async fn run_daemon(config_path: Option<PathBuf>, args: RunArgs) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    if let Some(interface) = args.interface {
        config.capture.interface = interface;
    }
    if args.view {
        config.ban.view_mode = true;
    }

    EventLogger::init(&config.telemetry.log_level);
    let metrics = MetricsRecorder::new();

    let rules = RuleSync::new(backend(&config)?, set_names(&config));
    let store = BanStore::open(&config.store.path, config.store.page_size)?;
    let mut controller = BanController::new(config, store, rules, metrics);

    controller.start().await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
        _ = sigterm.recv() => info!("termination signal received, shutting down"),
        result = controller.wait_for_capture() => {
            if let Err(e) = result {
                error!(error = %e, "event source failed, shutting down");
            }
        }
    }

    controller.stop().await?;
    Ok(())
}

pub fn teardown(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    EventLogger::init(&config.telemetry.log_level);

    let mut rules = RuleSync::new(backend(&config)?, set_names(&config));
    rules.destroy()?;
    info!("firewall sets and chain removed");
    Ok(())
}

pub fn list_bans(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = BanStore::open(&config.store.path, config.store.page_size)?;

    let total = store.for_each(|record| {
        println!(
            "{:<6} {:<15} {:<20} visits {:>5}  first {}  last {}",
            record.id,
            record.ip,
            record.remark,
            record.visit_count,
            format_ts(record.created_at_ms),
            format_ts(record.last_seen_at_ms),
        );
    })?;
    println!("{total} record(s)");
    Ok(())
}

fn format_ts(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
