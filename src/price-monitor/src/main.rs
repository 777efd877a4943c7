//! Price Monitor - watches marketplace prices and alerts on real discounts.
//!
//! Each cycle walks the product catalog, fetches the current price of every
//! active entry from Amazon, Mercado Livre or Shopee, and sends a Telegram
//! alert when the drop against the historical low clears the thresholds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::http::build_http_client;
use common::{
    Config, LogNotifier, Notifier, PriceStore, QuarantineLog, Sources, TelegramNotifier,
};

mod detector;
mod health;
mod metrics;
mod monitor;

use detector::PolicyConfig;
use metrics::Metrics;
use monitor::{CycleError, CycleReport, Monitor, MonitorSettings};

/// Price Monitor - alerts on marketplace price drops
#[derive(Parser, Debug)]
#[command(name = "price-monitor")]
#[command(about = "Tracks Amazon, Mercado Livre and Shopee prices and alerts on real discounts")]
struct Args {
    /// Run one cycle and exit (instead of continuous polling)
    #[arg(long)]
    once: bool,

    /// Cycle interval in seconds
    #[arg(long, default_value = "1800")]
    interval: u64,

    /// Product catalog (overrides CATALOG_PATH)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Price state file (overrides STATE_PATH)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Pause between items in milliseconds (overrides ITEM_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Random extra pause between items in milliseconds (overrides ITEM_JITTER_MS)
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Serve GET /health on this port
    #[arg(long)]
    health_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(path) = args.catalog {
        config.catalog_path = path;
    }
    if let Some(path) = args.state {
        config.state_path = path;
    }
    if let Some(ms) = args.delay_ms {
        config.item_delay_ms = ms;
    }
    if let Some(ms) = args.jitter_ms {
        config.item_jitter_ms = ms;
    }

    let policy = PolicyConfig::from_config(&config).context("Invalid alert policy")?;

    info!("=== Price Monitor ===");
    info!(
        "Mode: {}",
        if args.once {
            "single run"
        } else {
            "continuous"
        }
    );
    info!("Interval: {}s", args.interval);
    info!("Catalog: {}", config.catalog_path.display());
    info!("State: {}", config.state_path.display());
    info!(
        "Drop threshold: {}% | cooldown: {}h | reference: {}",
        policy.drop_threshold_percent,
        config.cooldown_hours,
        policy.reference_mode.as_str()
    );
    info!(
        "Item delay: {}ms + up to {}ms jitter",
        config.item_delay_ms, config.item_jitter_ms
    );

    let store = Arc::new(
        PriceStore::open(&config.state_path)
            .with_context(|| format!("Failed to open {}", config.state_path.display()))?,
    );
    let sources = Sources::from_config(&config);

    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_config(
        build_http_client(config.http_timeout()),
        &config.telegram,
    ) {
        Some(telegram) => Arc::new(telegram),
        None => {
            warn!("[TELEGRAM] TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    };
    info!("Notifier: {}", notifier.name());

    let monitor = Arc::new(Monitor::new(
        Arc::new(sources),
        store,
        notifier,
        QuarantineLog::new(&config.quarantine_path),
        policy,
        MonitorSettings::from_config(&config),
    ));
    let mut metrics = Metrics::new();

    if let Some(port) = args.health_port {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(monitor, port).await {
                error!("[HEALTH] Failed to serve on port {}: {}", port, e);
            }
        });
    }

    if args.once {
        let report = monitor.run_cycle().await?;
        metrics.record_cycle(&report);
        metrics.print_summary();
        return Ok(());
    }

    // Cycles run in their own tasks so the healthcheck and shutdown stay responsive
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<CycleReport, CycleError>>();
    let mut interval = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, exiting...");
                break;
            }
            _ = interval.tick() => {
                let monitor = monitor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(monitor.run_cycle().await);
                });
            }
            Some(result) = rx.recv() => {
                match result {
                    Ok(report) => {
                        metrics.record_cycle(&report);
                        metrics.print_summary();
                    }
                    Err(CycleError::AlreadyRunning) => {
                        warn!("[CYCLE] Previous cycle still running, skipping this tick");
                        metrics.record_skipped();
                    }
                    Err(e) => {
                        error!("[CYCLE] Cycle failed: {}", e);
                        metrics.record_failed_cycle();
                    }
                }
            }
        }
    }

    if monitor.is_running() {
        warn!("[CYCLE] Exiting with a cycle in progress; state is flushed per item");
    }
    metrics.print_summary();
    Ok(())
}
