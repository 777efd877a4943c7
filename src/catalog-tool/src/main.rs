//! Operator tooling for the product catalog, price state and quarantine record.
//!
//! Usage:
//!   catalog-tool number             # Assign `seq` to entries without one
//!   catalog-tool validate           # Report malformed entries
//!   catalog-tool quarantine         # List quarantined products
//!   catalog-tool show --id MLB123   # Print one product's stored state
//!   catalog-tool reset --id MLB123  # Forget one product (next fetch is a baseline)
//!   catalog-tool reset --all        # Forget every product

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Catalog, Config, Platform, PriceStore, QuarantineLog};

#[derive(Parser, Debug)]
#[command(name = "catalog-tool")]
#[command(about = "Maintain the price monitor catalog and state files")]
struct Cli {
    /// Product catalog (overrides CATALOG_PATH)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Price state file (overrides STATE_PATH)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Quarantine record (overrides QUARANTINE_PATH)
    #[arg(long, global = true)]
    quarantine: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assign `seq` (1-based position) to entries that lack one
    Number,
    /// Check every entry's platform and identifier
    Validate,
    /// List products removed after repeated NOT_FOUND
    Quarantine,
    /// Print the stored state of one product
    Show {
        #[arg(long)]
        id: String,
    },
    /// Delete stored state so the next observation is a fresh baseline
    Reset {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<String>,

        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let catalog_path = cli.catalog.unwrap_or(config.catalog_path);
    let state_path = cli.state.unwrap_or(config.state_path);
    let quarantine_path = cli.quarantine.unwrap_or(config.quarantine_path);

    match cli.command {
        Command::Number => number(catalog_path),
        Command::Validate => validate(catalog_path),
        Command::Quarantine => list_quarantine(quarantine_path),
        Command::Show { id } => show(state_path, &id),
        Command::Reset { id, all } => reset(state_path, id.as_deref(), all),
    }
}

fn number(path: PathBuf) -> Result<()> {
    let mut catalog = Catalog::load(&path)?;
    catalog.number();
    catalog.save()?;
    info!(
        "[CATALOG] Numbered {} entries in {}",
        catalog.entries.len(),
        path.display()
    );
    Ok(())
}

fn validate(path: PathBuf) -> Result<()> {
    let catalog = Catalog::load(&path)?;
    let errors = catalog.validate();
    let active = catalog.entries.iter().filter(|e| e.is_active()).count();

    println!("Catalog: {}", path.display());
    println!(
        "  {} entries ({} active, {} disabled)",
        catalog.entries.len(),
        active,
        catalog.entries.len() - active
    );

    if errors.is_empty() {
        println!("  All entries valid");
        return Ok(());
    }

    println!("  {} invalid:", errors.len());
    for error in &errors {
        println!("    - {}", error);
    }
    bail!("{} invalid catalog entries", errors.len())
}

fn list_quarantine(path: PathBuf) -> Result<()> {
    let records = QuarantineLog::new(&path).load()?;
    if records.is_empty() {
        println!("No quarantined products");
        return Ok(());
    }

    println!("{}", "=".repeat(50));
    println!("Quarantined products ({}):", records.len());
    println!("{}", "=".repeat(50));
    for record in records {
        println!(
            "  {} {:<16} {} failures  {}  {}",
            record.quarantined_at.format("%Y-%m-%d %H:%M"),
            format!("{}:{}", record.platform, record.external_id),
            record.failures,
            record.reason,
            record.title.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Find the stored key for an id as typed by the operator (`MLB-123`, `b0abc...`).
fn resolve_id(store: &PriceStore, raw: &str) -> Result<Option<String>> {
    if store.get(raw)?.is_some() {
        return Ok(Some(raw.to_string()));
    }
    for platform in Platform::ALL {
        if let Some(id) = platform.normalize_id(raw) {
            if store.get(&id)?.is_some() {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

fn show(path: PathBuf, raw_id: &str) -> Result<()> {
    let store = PriceStore::open(&path)?;
    let Some(id) = resolve_id(&store, raw_id)? else {
        bail!("No stored state for {}", raw_id);
    };

    if let Some(state) = store.get(&id)? {
        println!("{}", id);
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}

fn reset(path: PathBuf, raw_id: Option<&str>, all: bool) -> Result<()> {
    let store = PriceStore::open(&path)?;

    if all {
        let removed = store.clear()?;
        info!("[STORE] Reset {} products in {}", removed, path.display());
        return Ok(());
    }

    let raw_id = raw_id.context("--id or --all is required")?;
    let id = resolve_id(&store, raw_id)?.unwrap_or_else(|| raw_id.to_string());
    match store.remove(&id)? {
        Some(_) => info!("[STORE] Reset {}", id),
        None => info!("[STORE] Nothing stored for {}", raw_id),
    }
    Ok(())
}
