#![forbid(unsafe_code)]
//! MeshCredit ledger command-line interface

use clap::{Parser, Subcommand};
use colored::*;
use meshcredit::amount::{parse_amount, Amount};
use meshcredit::cli::{init_tracing, load_cli_config, load_ledger_from_config, new_table, report_error, wallet_table};
use meshcredit::error::Result;
use meshcredit::ledger::SealWeight;
use meshcredit::service::MeshLedger;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

fn amount_arg(s: &str) -> std::result::Result<Amount, String> {
    parse_amount(s).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "mesh-credit", author, version, about = "Mint, move, stake and audit MeshCredit", long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: ./meshcredit.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and fund wallets
    #[command(subcommand)]
    Wallet(WalletCommand),
    /// Yield-bearing staking
    #[command(subcommand)]
    Stake(StakeCommand),
    /// Governance staking
    #[command(subcommand)]
    Governance(GovernanceCommand),
    /// Spend credits on items
    #[command(subcommand)]
    Shop(ShopCommand),
    /// Economy-wide views
    #[command(subcommand)]
    Economy(EconomyCommand),
    /// Flash-sale promotions
    #[command(subcommand)]
    Promotion(PromotionCommand),
    /// Block sealing and verification
    #[command(subcommand)]
    Chain(ChainCommand),
}

#[derive(Subcommand)]
enum WalletCommand {
    Create {
        id: String,
        /// Initial balance, minted as a wallet grant
        #[arg(long, value_parser = amount_arg)]
        balance: Option<Amount>,
    },
    Get {
        id: String,
    },
    /// Deposit external value and mint the matching credits
    Deposit {
        id: String,
        #[arg(value_parser = amount_arg)]
        usd: Amount,
    },
    Transfer {
        from: String,
        to: String,
        #[arg(value_parser = amount_arg)]
        amount: Amount,
    },
}

#[derive(Subcommand)]
enum StakeCommand {
    Add {
        id: String,
        #[arg(value_parser = amount_arg)]
        amount: Amount,
        /// Lockup length in days
        #[arg(long, default_value_t = 0)]
        lockup: u32,
    },
    Remove {
        id: String,
        #[arg(value_parser = amount_arg)]
        amount: Amount,
    },
    /// Show the projected yield for a wallet
    Yield {
        id: String,
    },
    /// Pay one epoch of yield
    Epoch {
        /// Pay even if the epoch length has not elapsed
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum GovernanceCommand {
    Stake {
        id: String,
        #[arg(value_parser = amount_arg)]
        amount: Amount,
    },
    Unstake {
        id: String,
        #[arg(value_parser = amount_arg)]
        amount: Amount,
    },
}

#[derive(Subcommand)]
enum ShopCommand {
    Buy {
        id: String,
        item_id: String,
        item_type: String,
        rarity: String,
    },
}

#[derive(Subcommand)]
enum EconomyCommand {
    /// Recompute the manifest and store it
    Update,
    /// Show the current manifest and ledger status
    Status,
}

#[derive(Subcommand)]
enum PromotionCommand {
    Activate {
        /// How long the sale runs, e.g. "24h" or "90m"
        #[arg(long, value_parser = humantime::parse_duration, default_value = "24h")]
        duration: Duration,
        #[arg(long, default_value_t = 2.0)]
        multiplier: f64,
    },
    Deactivate,
    Status,
}

#[derive(Subcommand)]
enum ChainCommand {
    /// Seal pending transactions into a block
    Mine {
        /// Sealer trust score (default: the configured authority trust)
        #[arg(long)]
        trust: Option<f64>,
        /// Wallet credited with the block reward (default: the authority id)
        #[arg(long)]
        sealer: Option<String>,
    },
    Verify,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_cli_config(cli.config.as_deref(), cli.data_dir)?;
    let mut ledger = load_ledger_from_config(&config)?;

    match cli.command {
        Commands::Wallet(cmd) => wallet(&mut ledger, cmd),
        Commands::Stake(cmd) => stake(&mut ledger, cmd),
        Commands::Governance(cmd) => governance(&mut ledger, cmd),
        Commands::Shop(ShopCommand::Buy { id, item_id, item_type, rarity }) => {
            let receipt = ledger.buy_item(&id, &item_id, &item_type, &rarity)?;
            println!(
                "{} {} ({} {}) for {} credits",
                "Purchased".bright_green().bold(),
                receipt.item_id.bright_white(),
                receipt.rarity,
                receipt.item_type,
                receipt.price.to_string().bright_yellow()
            );
            Ok(())
        }
        Commands::Economy(cmd) => economy(&mut ledger, cmd),
        Commands::Promotion(cmd) => promotion(&mut ledger, cmd),
        Commands::Chain(cmd) => chain(&mut ledger, cmd),
    }
}

fn wallet(ledger: &mut MeshLedger, cmd: WalletCommand) -> Result<()> {
    match cmd {
        WalletCommand::Create { id, balance } => {
            let wallet = ledger.create_wallet(&id, balance)?;
            println!("{} {}", "Created wallet".bright_green().bold(), wallet.id.bright_white());
            println!("{}", wallet_table(&wallet)?);
        }
        WalletCommand::Get { id } => {
            let wallet = ledger.wallet(&id)?;
            println!("{}", wallet_table(&wallet)?);
        }
        WalletCommand::Deposit { id, usd } => {
            let receipt = ledger.deposit(&id, usd)?;
            println!(
                "{} ${} -> {} credits to {} (reserve now {})",
                "Deposited".bright_green().bold(),
                receipt.usd_amount,
                receipt.mint.credited.to_string().bright_yellow(),
                id.bright_white(),
                receipt.external_reserve
            );
        }
        WalletCommand::Transfer { from, to, amount } => {
            let tx = ledger.transfer(&from, &to, amount)?;
            println!(
                "{} {} from {} to {} ({})",
                "Transferred".bright_green().bold(),
                amount.to_string().bright_yellow(),
                from.bright_white(),
                to.bright_white(),
                tx.hash_str().dimmed()
            );
        }
    }
    Ok(())
}

fn stake(ledger: &mut MeshLedger, cmd: StakeCommand) -> Result<()> {
    match cmd {
        StakeCommand::Add { id, amount, lockup } => {
            let wallet = ledger.stake(&id, amount, lockup)?;
            println!("{} {} (lockup {}d)", "Staked".bright_green().bold(), amount, lockup);
            println!("{}", wallet_table(&wallet)?);
        }
        StakeCommand::Remove { id, amount } => {
            let wallet = ledger.unstake(&id, amount)?;
            println!("{} {}", "Unstaked".bright_green().bold(), amount);
            println!("{}", wallet_table(&wallet)?);
        }
        StakeCommand::Yield { id } => {
            let y = ledger.calculate_yield(&id)?;
            let mut table = new_table(vec!["Component", "Value"]);
            table.add_row(vec!["Tier".to_string(), y.tier.clone()]);
            table.add_row(vec!["Base APY".to_string(), format!("{:.2}%", y.base_apy * 100.0)]);
            table.add_row(vec!["Tier bonus".to_string(), format!("{:.2}%", y.tier_bonus * 100.0)]);
            table.add_row(vec!["Lockup bonus".to_string(), format!("{:.2}%", y.lockup_bonus * 100.0)]);
            table.add_row(vec!["Governance bonus".to_string(), format!("{:.2}%", y.governance_bonus * 100.0)]);
            table.add_row(vec!["Total APY".to_string(), format!("{:.2}%", y.total_apy * 100.0)]);
            table.add_row(vec!["Daily yield".to_string(), y.daily_yield.to_string()]);
            table.add_row(vec!["Epoch yield".to_string(), y.epoch_yield.to_string()]);
            println!("{}", table);
        }
        StakeCommand::Epoch { force } => {
            let report = ledger.process_epoch(force)?;
            println!(
                "{} epoch {}: {} credits to {} wallets",
                "Processed".bright_green().bold(),
                report.epoch,
                report.total_distributed.to_string().bright_yellow(),
                report.wallets.len()
            );
            let mut table = new_table(vec!["Wallet", "Tier", "APY", "Yield"]);
            for w in &report.wallets {
                table.add_row(vec![
                    w.wallet.clone(),
                    w.tier.clone(),
                    format!("{:.2}%", w.total_apy * 100.0),
                    w.epoch_yield.to_string(),
                ]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

fn governance(ledger: &mut MeshLedger, cmd: GovernanceCommand) -> Result<()> {
    let (label, wallet) = match cmd {
        GovernanceCommand::Stake { id, amount } => ("Governance staked", ledger.governance_stake(&id, amount)?),
        GovernanceCommand::Unstake { id, amount } => ("Governance unstaked", ledger.governance_unstake(&id, amount)?),
    };
    println!(
        "{} {} (vote weight {})",
        label.bright_green().bold(),
        wallet.id.bright_white(),
        wallet.vote_weight.to_string().bright_yellow()
    );
    Ok(())
}

fn economy(ledger: &mut MeshLedger, cmd: EconomyCommand) -> Result<()> {
    let manifest = match cmd {
        EconomyCommand::Update => {
            let (manifest, hash) = ledger.update_economy()?;
            println!("{} {}", "Manifest stored as".bright_green().bold(), hash.dimmed());
            manifest
        }
        EconomyCommand::Status => {
            let status = ledger.status()?;
            println!(
                "{} pending tx, {} proofs, {} events, flash sale {}",
                status.pending_transactions,
                status.proofs,
                status.events,
                if status.flash_sale_active { "active".bright_green() } else { "inactive".normal() }
            );
            status.manifest
        }
    };

    let mut table = new_table(vec!["Metric", "Value"]);
    table.add_row(vec!["Total supply".to_string(), manifest.total_supply.to_string()]);
    table.add_row(vec!["Circulating".to_string(), manifest.circulating_supply.to_string()]);
    table.add_row(vec!["Staked".to_string(), manifest.staked_supply.to_string()]);
    table.add_row(vec!["Governance staked".to_string(), manifest.governance_staked.to_string()]);
    table.add_row(vec!["External reserve".to_string(), manifest.external_reserve.to_string()]);
    table.add_row(vec!["Mint events".to_string(), manifest.mint_events.to_string()]);
    table.add_row(vec!["Burn events".to_string(), manifest.burn_events.to_string()]);
    table.add_row(vec!["Epochs completed".to_string(), manifest.epochs_completed.to_string()]);
    table.add_row(vec!["Block height".to_string(), manifest.block_height.to_string()]);
    table.add_row(vec!["Wallets".to_string(), manifest.wallets.to_string()]);
    println!("{}", table);
    Ok(())
}

fn promotion(ledger: &mut MeshLedger, cmd: PromotionCommand) -> Result<()> {
    match cmd {
        PromotionCommand::Activate { duration, multiplier } => {
            let hours = duration.as_secs_f64() / 3600.0;
            let record = ledger.activate_flash_sale(hours, multiplier)?;
            println!(
                "{} {}x until {}",
                "Flash sale active:".bright_green().bold(),
                record.multiplier,
                record.end_time.map(|t| t.to_rfc3339()).unwrap_or_default()
            );
        }
        PromotionCommand::Deactivate => {
            let record = ledger.deactivate_flash_sale()?;
            println!(
                "{} {} bonus credits over {} boosted mints",
                "Flash sale ended:".bright_yellow().bold(),
                record.total_bonus_minted,
                record.transactions_boosted
            );
        }
        PromotionCommand::Status => {
            let sale = ledger.flash_sale();
            let active = ledger.flash_sale_active();
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec!["Active".to_string(), active.to_string()]);
            table.add_row(vec!["Multiplier".to_string(), sale.multiplier.to_string()]);
            table.add_row(vec![
                "Ends".to_string(),
                sale.end_time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
            ]);
            table.add_row(vec!["Bonus minted".to_string(), sale.total_bonus_minted.to_string()]);
            table.add_row(vec!["Boosted mints".to_string(), sale.transactions_boosted.to_string()]);
            println!("{}", table);
        }
    }
    Ok(())
}

fn chain(ledger: &mut MeshLedger, cmd: ChainCommand) -> Result<()> {
    match cmd {
        ChainCommand::Mine { trust, sealer } => {
            let ledger_config = &ledger.config().ledger;
            let seal = SealWeight::new(
                sealer.unwrap_or_else(|| ledger_config.authority_id.clone()),
                trust.unwrap_or(ledger_config.authority_trust),
            );
            match ledger.mine_block(seal)? {
                Some(block) => println!(
                    "{} block {} ({} transactions) {}",
                    "Sealed".bright_green().bold(),
                    block.header.index,
                    block.transactions.len(),
                    block.hash_str().dimmed()
                ),
                None => println!("{}", "Nothing sealed: no pending transactions or trust below the gravity floor".yellow()),
            }
        }
        ChainCommand::Verify => {
            ledger.validate_chain()?;
            ledger.validate_proof_chain()?;
            println!(
                "{} {} blocks, {} proofs",
                "Verified".bright_green().bold(),
                ledger.chain().len(),
                ledger.proof_chain().len()
            );
        }
    }
    Ok(())
}
