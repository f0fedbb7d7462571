//! repo-migrate - repository migration orchestrator CLI
//!
//! ## Commands
//!
//! - `run`: migrate every repository in an inventory in bounded batches
//! - `monitor`: watch target-side progress and dependency health, alerting on trouble
//! - `health`: probe every configured dependency once
//! - `status`: print the latest persisted status, batch report and monitor summary
//! - `test-alert`: send a synthetic alert through every enabled channel
//!
//! Exit codes: 0 ok, 1 warning or unhealthy, 2 error or fatal failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migration_core::batch::executor::REPORT_SNAPSHOT;
use migration_core::config::PlatformConfig;
use migration_core::metrics::METRICS;
use migration_core::orchestrator::{STATUS_SNAPSHOT, SUMMARY_SNAPSHOT};
use migration_core::telemetry::init_tracing;
use migration_core::{
    load_inventory, Alert, AlertDispatcher, AlertType, BatchExecutor, CommandMigrationOperation,
    DispatchOutcome, GatewayConfig, GatewayProbe, HealthMonitor, HealthState, HttpGateway,
    MigrationConfig, MigrationError, MigrationStateTracker, MonitorLoop, NetworkProbe, Severity,
    StopHandle, TargetOrgProgress,
};
use migration_state::{FsMetricLog, FsSnapshotStore, SnapshotStore, StorageError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "repo-migrate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch repository migration with progress tracking, health checks and alerting", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "migration.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every repository listed in the inventory
    Run {
        /// Inventory file, one `source[,target]` per line
        #[arg(short, long)]
        inventory: PathBuf,

        /// Skip the credential check against the source and target APIs
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Watch migration progress and dependency health
    Monitor {
        /// Inventory file used to decide which target repositories count
        #[arg(short, long)]
        inventory: PathBuf,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Probe every configured dependency once
    Health,

    /// Show the latest persisted status snapshots
    Status,

    /// Send a synthetic alert through every enabled channel
    TestAlert {
        /// Alert severity (critical, high, medium, low, info)
        #[arg(short, long, default_value = "info", value_parser = parse_severity)]
        severity: Severity,

        /// Alert message
        #[arg(short, long, default_value = "Test alert from repo-migrate")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            let fatal = err
                .downcast_ref::<MigrationError>()
                .is_some_and(MigrationError::is_fatal);
            error!(error = %format!("{err:#}"), fatal, "repo-migrate failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = MigrationConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    match cli.command {
        Commands::Run {
            inventory,
            skip_preflight,
        } => cmd_run(&config, &inventory, skip_preflight).await,
        Commands::Monitor { inventory, once } => cmd_monitor(&config, &inventory, once).await,
        Commands::Health => cmd_health(&config, cli.json).await,
        Commands::Status => cmd_status(&config).await,
        Commands::TestAlert { severity, message } => {
            cmd_test_alert(&config, severity, &message).await
        }
    }
}

fn parse_severity(value: &str) -> std::result::Result<Severity, String> {
    Severity::ALL
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown severity '{value}'"))
}

fn gateway_for(platform: &PlatformConfig) -> Result<Arc<HttpGateway>> {
    let gateway = HttpGateway::new(GatewayConfig::from(platform)).map_err(MigrationError::from)?;
    Ok(Arc::new(gateway))
}

fn open_state(state_dir: &Path) -> Result<(Arc<FsSnapshotStore>, Arc<FsMetricLog>)> {
    let snapshots = FsSnapshotStore::new(state_dir)
        .with_context(|| format!("Failed to open snapshot store in {:?}", state_dir))?;
    let metrics = FsMetricLog::in_dir(state_dir)
        .with_context(|| format!("Failed to open metric log in {:?}", state_dir))?;
    Ok((Arc::new(snapshots), Arc::new(metrics)))
}

fn stop_on_ctrl_c(handle: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            handle.stop();
        }
    });
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(2))
}

/// Fail fast on a rejected credential before any item is attempted.
async fn preflight(config: &MigrationConfig) -> Result<()> {
    for platform in [&config.source, &config.target] {
        if !platform.is_configured() {
            continue;
        }
        let gateway = gateway_for(platform)?;
        gateway
            .verify_credentials(&platform.health_path)
            .await
            .map_err(MigrationError::from)
            .with_context(|| format!("Credential check against {} failed", platform.name))?;
        info!(platform = %platform.name, "credentials accepted");
    }
    Ok(())
}

async fn cmd_run(config: &MigrationConfig, inventory: &Path, skip_preflight: bool) -> Result<ExitCode> {
    let mut items = load_inventory(inventory).await?;
    if !skip_preflight {
        preflight(config).await?;
    }

    let operation = CommandMigrationOperation::new(config.batch.command.clone())?
        .with_completion_marker(config.batch.completion_marker.clone());
    let (snapshots, metric_log) = open_state(&config.state_dir)?;
    let tracker = Arc::new(
        MigrationStateTracker::new(config.monitor.stalled_threshold()).with_metric_log(metric_log),
    );
    let dispatcher = Arc::new(AlertDispatcher::from_settings(&config.alerts)?);

    let executor = BatchExecutor::new(config.batch.executor_config(), Arc::new(operation), tracker)
        .with_dispatcher(dispatcher)
        .with_snapshot_store(snapshots);
    stop_on_ctrl_c(executor.stop_handle());

    let result = executor.run(&mut items).await;
    METRICS.flush();
    let report = result?;

    println!("{}", report.render());
    Ok(exit_code(report.exit_code()))
}

fn build_health_monitor(config: &MigrationConfig) -> Result<HealthMonitor> {
    let mut monitor = HealthMonitor::new(config.health.monitor_config());
    for platform in [&config.source, &config.target] {
        if platform.is_configured() {
            let probe = GatewayProbe::new(
                platform.name.clone(),
                gateway_for(platform)?,
                platform.health_path.clone(),
            );
            monitor.register(Arc::new(probe));
        }
    }
    for address in &config.health.network_targets {
        monitor.register(Arc::new(NetworkProbe::new(address.clone())));
    }
    Ok(monitor)
}

async fn cmd_monitor(config: &MigrationConfig, inventory: &Path, once: bool) -> Result<ExitCode> {
    let items = load_inventory(inventory).await?;
    let organization = config.target.organization.clone().ok_or_else(|| {
        MigrationError::Configuration("target.organization is required for monitoring".to_string())
    })?;

    let progress = TargetOrgProgress::new(
        gateway_for(&config.target)?,
        organization,
        items.into_iter().map(|item| item.target_ref),
    );
    let (snapshots, metric_log) = open_state(&config.state_dir)?;
    let tracker = Arc::new(
        MigrationStateTracker::new(config.monitor.stalled_threshold()).with_metric_log(metric_log),
    );
    let dispatcher = Arc::new(AlertDispatcher::from_settings(&config.alerts)?);

    let mut loop_config = config.monitor.monitor_config();
    if once {
        loop_config.continuous = false;
    }

    let mut monitor = MonitorLoop::new(
        loop_config,
        build_health_monitor(config)?,
        Arc::new(progress),
        tracker,
        dispatcher,
    )
    .with_snapshot_store(snapshots);
    stop_on_ctrl_c(monitor.stop_handle());

    let result = monitor.run().await;
    METRICS.flush();
    let summary = result?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_health(config: &MigrationConfig, json: bool) -> Result<ExitCode> {
    let monitor = build_health_monitor(config)?;
    if monitor.dependencies().is_empty() {
        println!("No dependencies configured.");
        return Ok(ExitCode::SUCCESS);
    }

    let report = monitor.check_all().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for status in &report.statuses {
            let marker = match status.state {
                HealthState::Healthy => "✓",
                HealthState::Degraded => "~",
                HealthState::Unhealthy => "✗",
            };
            let latency = status
                .latency
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "-".to_string());
            print!(
                "  {} {:<28} {:<10} {:>8}  attempts={}",
                marker,
                status.dependency,
                format!("{:?}", status.state).to_lowercase(),
                latency,
                status.attempts
            );
            match &status.detail {
                Some(detail) => println!("  ({})", detail),
                None => println!(),
            }
        }
        println!();
        println!(
            "Overall: {}",
            if report.overall { "healthy" } else { "unhealthy" }
        );
    }

    Ok(if report.overall {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn cmd_status(config: &MigrationConfig) -> Result<ExitCode> {
    let store = FsSnapshotStore::new(&config.state_dir)
        .with_context(|| format!("Failed to open snapshot store in {:?}", config.state_dir))?;

    for name in [STATUS_SNAPSHOT, REPORT_SNAPSHOT, SUMMARY_SNAPSHOT] {
        match store.read(name).await {
            Ok(record) => {
                println!("== {} (written {})", name, record.written_at.to_rfc3339());
                println!("{}", serde_json::to_string_pretty(&record.payload)?);
            }
            Err(StorageError::SnapshotNotFound { .. }) => println!("== {}: none", name),
            Err(err) => return Err(err).with_context(|| format!("Failed to read {name}")),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_test_alert(
    config: &MigrationConfig,
    severity: Severity,
    message: &str,
) -> Result<ExitCode> {
    let dispatcher = AlertDispatcher::from_settings(&config.alerts)?;
    let channels: Vec<String> = dispatcher
        .channel_kinds()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Enabled channels: {}", channels.join(", "));

    let alert = Alert::new(AlertType::Custom("Test Alert".to_string()), severity, message)
        .with_data("source", "repo-migrate test-alert");
    let outcome = dispatcher.send(alert).await;

    match &outcome {
        DispatchOutcome::Suppressed { reason } => println!("Suppressed: {:?}", reason),
        DispatchOutcome::NoChannels => println!("No channels are enabled."),
        DispatchOutcome::Dispatched { delivered, failed } => {
            for kind in delivered {
                println!("  ✓ {}", kind);
            }
            for (kind, reason) in failed {
                println!("  ✗ {} ({})", kind, reason);
            }
        }
    }

    Ok(if outcome.is_delivered() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
