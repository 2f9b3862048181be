//! Watchlist Monitor - Headless Server
//!
//! Periodically checks watched wallets for new transactions, records alerts
//! and delivers them over Telegram.

mod config;
mod report;
mod status_notifier;

use clap::Parser;
use config::AppConfig;
use status_notifier::{try_start_status_notifier, StatusEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use watchlist_alerts::{Database, NotificationSink, TelegramBot};
use watchlist_core::RunSummary;
use watchlist_engine::{CycleOrchestrator, MonitorConfig};
use watchlist_providers::ProviderRegistry;

/// Watchlist Monitor CLI
#[derive(Parser, Debug)]
#[command(name = "watchlist-monitor")]
#[command(about = "Wallet watchlist transaction monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// SQLite database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Seconds between cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Directory for per-cycle Markdown reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Run a single cycle, print its JSON summary and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Also run the Telegram bot command handler
    #[arg(long, default_value_t = false)]
    with_bot: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(interval) = self.interval {
            config.monitor.interval_secs = interval;
        }
        if let Some(dir) = &self.report_dir {
            config.monitor.report_dir = Some(dir.clone());
        }
    }
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn save_report(dir: Option<&Path>, summary: &RunSummary) {
    let Some(dir) = dir else {
        return;
    };
    match report::write_report(dir, summary).await {
        Ok(path) => info!("Cycle report written to {}", path.display()),
        Err(e) => warn!("Failed to write cycle report: {}", e),
    }
}

/// Resolves once shutdown has been requested.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    config.apply_env();
    args.apply(&mut config);

    init_logging(&config.log_level);

    info!("Watchlist monitor starting...");
    info!("  Database: {}", config.database_url);
    info!("  Interval: {}s", config.monitor.interval_secs);
    if let Some(dir) = &config.monitor.report_dir {
        info!("  Reports: {}", dir.display());
    }
    info!(
        "  Pools: evm={} solana={}",
        config.providers.evm_concurrency, config.providers.solana_concurrency
    );

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return;
        }
    };

    let fetch_timeout = config.fetch_timeout();
    let registry = match ProviderRegistry::with_defaults(
        config.providers.etherscan(fetch_timeout),
        config.providers.helius(fetch_timeout),
    ) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to create chain providers: {}", e);
            return;
        }
    };
    if config.providers.etherscan_api_key.is_none() {
        warn!("ETHERSCAN_API_KEY not set, EVM items will fail to fetch");
    }
    if config.providers.helius_api_key.is_none() {
        warn!("HELIUS_API_KEY not set, Solana items will fail to fetch");
    }

    let bot = config
        .telegram
        .bot_token
        .as_deref()
        .map(|token| Arc::new(TelegramBot::new(token, db.clone())));

    let mut orchestrator =
        CycleOrchestrator::new(Arc::new(db.clone()), registry, MonitorConfig::from(&config));
    match &bot {
        Some(bot) => {
            orchestrator = orchestrator.with_sink(bot.clone() as Arc<dyn NotificationSink>);
        }
        None => info!("TELEGRAM_BOT_TOKEN not set, alerts are stored without delivery"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    if args.once {
        let summary = orchestrator
            .run_cycle_until(shutdown_requested(shutdown_rx))
            .await;
        save_report(config.monitor.report_dir.as_deref(), &summary).await;
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
        return;
    }

    let bot_handle = match (&bot, args.with_bot) {
        (Some(bot), true) => {
            info!("Starting Telegram command handler");
            Some(tokio::spawn(Arc::clone(bot).run()))
        }
        (None, true) => {
            warn!("--with-bot requires TELEGRAM_BOT_TOKEN");
            None
        }
        _ => None,
    };

    let status = try_start_status_notifier(&config.telegram);
    if let Some(status) = &status {
        status.send(StatusEvent::MonitorStarted).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.monitor.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Press Ctrl+C to stop...");

    let shutdown = shutdown_requested(shutdown_rx.clone());
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let summary = orchestrator
                    .run_cycle_until(shutdown_requested(shutdown_rx.clone()))
                    .await;
                save_report(config.monitor.report_dir.as_deref(), &summary).await;
                if let Some(status) = &status {
                    if !summary.is_clean() {
                        status.send(StatusEvent::CycleFinished(Box::new(summary))).await;
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    if let Some(status) = &status {
        status.send(StatusEvent::MonitorStopping).await;
        // Give the notifier a moment to deliver.
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    if let Some(handle) = bot_handle {
        handle.abort();
    }

    info!("Watchlist monitor stopped");
}
