//! Shared plumbing for the command-line binaries.

use crate::audit::FsContentStore;
use crate::config::{load_authority_secret, load_config, Config};
use crate::error::{LedgerError, Result};
use crate::persistence::Database;
use crate::service::MeshLedger;
use crate::wallet::Wallet;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration, applying a data directory override.
pub fn load_cli_config(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    Ok(config)
}

/// Open the ledger stored under the configured data directory.
pub fn load_ledger_from_config(config: &Config) -> Result<MeshLedger> {
    let storage = &config.storage;
    fs::create_dir_all(&storage.data_dir)?;
    let secret = load_authority_secret(storage)?;
    let db = Database::open(storage.database_path())?;
    let cas = FsContentStore::with_cache_capacity(storage.cas_path(), storage.cas_cache_capacity)?;

    MeshLedger::builder(config.clone())
        .persistence(Box::new(db))
        .content_store(Arc::new(cas))
        .secret(secret)
        .open()
}

/// Print `error[<Kind>]: <reason>` to stderr.
pub fn report_error(err: &LedgerError) {
    eprintln!("{}: {}", format!("error[{}]", err.kind()).red().bold(), err);
}

pub fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

pub fn wallet_table(wallet: &Wallet) -> Result<Table> {
    let mut table = new_table(vec!["Field", "Value"]);
    table.add_row(vec!["Wallet".to_string(), wallet.id.clone()]);
    table.add_row(vec!["Balance".to_string(), wallet.balance.to_string()]);
    table.add_row(vec!["Available".to_string(), wallet.available()?.to_string()]);
    table.add_row(vec!["Staked".to_string(), wallet.staked.to_string()]);
    table.add_row(vec!["Governance staked".to_string(), wallet.governance_staked.to_string()]);
    table.add_row(vec!["Vote weight".to_string(), wallet.vote_weight.to_string()]);
    for lockup in &wallet.lockups {
        table.add_row(vec![
            format!("Lockup {}d", lockup.duration_days),
            format!("{} until {}", lockup.amount, lockup.unlock_time.to_rfc3339()),
        ]);
    }
    table.add_row(vec!["Created".to_string(), wallet.created_at.to_rfc3339()]);
    Ok(table)
}
