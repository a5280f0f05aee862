//! Budget Guard CLI
//!
//! Command-line interface for the Budget Guard spend monitor.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use budget_guard::alerting::{LogNotifier, Notifier, SlackApi};
use budget_guard::config::{resolve_secret, Config};
use budget_guard::cooldown::{self, CooldownReport};
use budget_guard::mitigation::{AlbRuleBackend, DryRunBackend, MitigationBackend};
use budget_guard::models::cents_to_dollars;
use budget_guard::monitor::{AccountMonitor, AccountReport};
use budget_guard::providers::{http_client, RunpodClient};
use budget_guard::workers::{update_workers, WorkerAction, WorkersReport};
use budget_guard::{telemetry, BudgetGuard, CycleReport};
use chrono::Utc;
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::{error, info, warn};

/// Budget Guard - daily spend limits for managed compute
#[derive(Parser)]
#[command(name = "budget-guard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "BUDGET_GUARD_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured guard until interrupted
    Run {
        /// Log kill switch changes instead of applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single cycle of every guard and print the results
    Check {
        /// Log kill switch changes instead of applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and exit
    Validate,

    /// Scale the configured serverless endpoints up or down
    Workers {
        /// Action to apply
        #[arg(value_enum)]
        action: WorkerAction,
    },

    /// Watch the Runpod balance and active worker count
    Monitor {
        /// Run a single check and print the result
        #[arg(long)]
        once: bool,
    },

    /// Set the scale-down cooldown of the configured Cerebrium apps
    Cooldown {
        /// Cooldown period in seconds (at least 30)
        #[arg(long, value_parser = cooldown::parse_cooldown_seconds)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let _log_guard = match telemetry::init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run { dry_run } => run_guards(&config, dry_run).await,
        Commands::Check { dry_run } => run_check(&config, dry_run, cli.format).await,
        Commands::Validate => run_validate(&config, cli.format),
        Commands::Workers { action } => run_workers(&config, action, cli.format).await,
        Commands::Monitor { once } => run_monitor(&config, once, cli.format).await,
        Commands::Cooldown { seconds } => run_cooldown(&config, seconds, cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Slack when configured, the log otherwise
struct NotifierFactory {
    slack: Option<SlackApi>,
}

impl NotifierFactory {
    fn new(config: &Config, http: &Client) -> anyhow::Result<Self> {
        let slack = match &config.slack {
            Some(slack) => {
                let token = resolve_secret(&slack.token_env)?;
                Some(SlackApi::new(http.clone(), slack.api_base.clone(), token))
            }
            None => {
                warn!("No [slack] section configured, notifications are only logged");
                None
            }
        };
        Ok(Self { slack })
    }

    fn channel(&self, channel: &str) -> Arc<dyn Notifier> {
        match &self.slack {
            Some(api) => Arc::new(api.channel(channel)),
            None => Arc::new(LogNotifier::new(channel)),
        }
    }
}

async fn build_backend(config: &Config, dry_run: bool) -> Arc<dyn MitigationBackend> {
    if dry_run {
        warn!("Dry run: kill switch targets will not be changed");
        return Arc::new(DryRunBackend);
    }

    let regions = config
        .guards
        .iter()
        .flat_map(|guard| guard.targets.iter().map(|t| t.region.as_str()));
    Arc::new(AlbRuleBackend::new(regions, config.http.request_timeout).await)
}

async fn build_guards(config: &Config, dry_run: bool) -> anyhow::Result<Vec<BudgetGuard>> {
    let guards = config.require_guards()?;
    let http = http_client(config.http.request_timeout)?;
    let notifiers = NotifierFactory::new(config, &http)?;
    let backend = build_backend(config, dry_run).await;

    guards
        .iter()
        .map(|guard| {
            BudgetGuard::from_config(guard, &http, backend.clone(), notifiers.channel(&guard.channel))
                .with_context(|| format!("failed to set up guard '{}'", guard.name))
        })
        .collect()
}

async fn run_guards(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    let guards = build_guards(config, dry_run).await?;
    let monitor = match &config.monitor {
        Some(_) => Some(build_monitor(config)?),
        None => None,
    };
    info!(guards = guards.len(), monitor = monitor.is_some(), "Budget guard starting");

    let loops = futures::future::join_all(guards.into_iter().map(BudgetGuard::run));
    let monitor = async {
        match monitor {
            Some(monitor) => monitor.run().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = loops => {}
        () = monitor => {}
        () = shutdown_signal() => info!("Shutdown signal received, stopping"),
    }

    Ok(())
}

fn build_monitor(config: &Config) -> anyhow::Result<AccountMonitor> {
    let monitor = config
        .monitor
        .as_ref()
        .context("no [monitor] section configured")?;

    let http = http_client(config.http.request_timeout)?;
    let notifier = NotifierFactory::new(config, &http)?.channel(&monitor.channel);
    AccountMonitor::from_config(monitor, &http, notifier)
        .context("failed to set up the account monitor")
}

async fn run_monitor(config: &Config, once: bool, format: OutputFormat) -> anyhow::Result<()> {
    let mut monitor = build_monitor(config)?;

    if !once {
        tokio::select! {
            () = monitor.run() => {}
            () = shutdown_signal() => info!("Shutdown signal received, stopping"),
        }
        return Ok(());
    }

    let report = monitor.check().await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_account(&report),
    }
    Ok(())
}

fn print_account(report: &AccountReport) {
    if let Some(balance) = report.balance {
        let state = if report.low_balance { "LOW" } else { "ok" };
        println!("balance: ${balance:.2} ({state})");
    }
    if let (Some(active), Some(endpoints)) = (report.active_workers, report.endpoints) {
        let state = if report.workers_exceeded { "ABOVE THRESHOLD" } else { "ok" };
        println!("active workers: {active} across {endpoints} endpoint(s) ({state})");
    }
    if let Some(deactivation) = &report.deactivation {
        print_workers(deactivation);
    }
}

async fn run_cooldown(config: &Config, seconds: u64, format: OutputFormat) -> anyhow::Result<()> {
    let settings = config
        .cooldown
        .as_ref()
        .context("no [cooldown] section configured")?;

    let http = http_client(config.http.request_timeout)?;
    let notifier = NotifierFactory::new(config, &http)?.channel(&settings.channel);
    let apps = cooldown::apps_from_config(settings, &http)?;

    let report = cooldown::update_cooldown(&apps, seconds, notifier.as_ref()).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_cooldown(&report),
    }

    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} application(s) could not be updated");
    }
    Ok(())
}

fn print_cooldown(report: &CooldownReport) {
    for update in &report.updates {
        match &update.error {
            None => println!("{}: cooldown = {}s", update.app, report.seconds),
            Some(e) => println!("{}: failed: {e}", update.app),
        }
    }
}

async fn run_check(config: &Config, dry_run: bool, format: OutputFormat) -> anyhow::Result<()> {
    let guards = build_guards(config, dry_run).await?;

    let mut reports = Vec::with_capacity(guards.len());
    for mut guard in guards {
        reports.push(guard.run_cycle(Utc::now()).await);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "{}: ${:.2} spent on {} -> {} (kill switch {})",
        report.guard,
        report.total_dollars,
        report.spend.as_of_date,
        report.severity,
        if report.latch.is_activated() { "activated" } else { "armed" },
    );
    for sample in &report.spend.samples {
        println!("   {:<24} ${:.2}", sample.source_id, cents_to_dollars(sample.amount_cents));
    }
    for gap in &report.spend.gaps {
        println!("   {:<24} missing ({:?})", gap.source_id, gap.reason);
    }
}

fn run_validate(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    config.require_guards()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("Configuration OK");
            for guard in &config.guards {
                println!(
                    "   {}: soft ${:.2}, hard ${:.2}, every {}, {} source(s), {} target(s), channel #{}",
                    guard.name,
                    guard.thresholds.soft_dollars,
                    guard.thresholds.hard_dollars,
                    humantime::format_duration(guard.poll_interval),
                    guard.sources.len(),
                    guard.targets.len(),
                    guard.channel,
                );
            }
        }
    }

    Ok(())
}

async fn run_workers(
    config: &Config,
    action: WorkerAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let workers = config
        .workers
        .as_ref()
        .context("no [workers] section configured")?;

    let http = http_client(config.http.request_timeout)?;
    let notifier = NotifierFactory::new(config, &http)?.channel(&workers.channel);
    let api_key = resolve_secret(&workers.api_key_env)?;
    let client = RunpodClient::new(http, &workers.api_base, &api_key)?;

    let report = update_workers(&client, &workers.endpoints, action, notifier.as_ref()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_workers(&report),
    }

    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} endpoint(s) could not be updated");
    }
    Ok(())
}

fn print_workers(report: &WorkersReport) {
    for update in &report.updates {
        match &update.error {
            None => println!("{}: workersMin = {}", update.endpoint, update.workers_min),
            Some(e) => println!("{}: failed: {e}", update.endpoint),
        }
    }
    for name in &report.missing {
        println!("{name}: not found");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
