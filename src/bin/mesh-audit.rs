#![forbid(unsafe_code)]
//! MeshCredit audit tool: integrity checks over the chain, proofs, events,
//! sealed files and the content-addressed store

use clap::{Parser, Subcommand};
use colored::*;
use meshcredit::audit::events::{export_jsonl, read_jsonl};
use meshcredit::audit::seal::{reseal, seal_file, verify_file, SealRecord};
use meshcredit::cli::{init_tracing, load_cli_config, load_ledger_from_config, new_table, report_error};
use meshcredit::error::{LedgerError, Result};
use meshcredit::service::MeshLedger;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mesh-audit", author, version, about = "Verify MeshCredit ledger integrity", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the block chain, proof chain, event log and wallet balances
    Verify,
    /// Write a seal next to a file
    Seal { file: PathBuf },
    /// Compare a file against its seal
    Check { file: PathBuf },
    /// Replace the seal of an intentionally edited file
    Reseal { file: PathBuf },
    /// List ledger events, or move them through JSON lines
    Events {
        /// Write the event log to this file
        #[arg(long, conflicts_with = "import")]
        export: Option<PathBuf>,
        /// Read and verify an exported event log instead of the ledger's
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// Inspect the content-addressed store
    #[command(subcommand)]
    Cas(CasCommand),
}

#[derive(Subcommand)]
enum CasCommand {
    /// Print a stored object
    Get { hash: String },
    /// Re-hash every stored object
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
    // File seal commands work on any path and never touch the ledger.
    match &cli.command {
        Commands::Seal { file } => return print_seal("Sealed", file, seal_file(file)?),
        Commands::Check { file } => return print_seal("Intact", file, verify_file(file)?),
        Commands::Reseal { file } => return print_seal("Resealed", file, reseal(file)?),
        Commands::Events { import: Some(path), .. } => return import_events(path),
        _ => {}
    }

    let config = load_cli_config(cli.config.as_deref(), cli.data_dir)?;
    let ledger = load_ledger_from_config(&config)?;

    match cli.command {
        Commands::Verify => verify_all(&ledger),
        Commands::Events { export, .. } => events(&ledger, export.as_deref()),
        Commands::Cas(CasCommand::Get { hash }) => {
            ledger.content_store().verify(&hash)?;
            let bytes = ledger
                .content_store()
                .get_bytes(&hash)?
                .ok_or_else(|| LedgerError::IntegrityMismatch(format!("object {} is missing", hash)))?;
            let value: serde_json::Value = serde_json::from_slice(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Commands::Cas(CasCommand::Verify) => {
            let store = ledger.content_store();
            let keys = store.list()?;
            for key in &keys {
                store.verify(key)?;
            }
            println!("{} {} objects", "Verified".bright_green().bold(), keys.len());
            Ok(())
        }
        Commands::Seal { .. } | Commands::Check { .. } | Commands::Reseal { .. } => Ok(()),
    }
}

fn print_seal(label: &str, file: &Path, record: SealRecord) -> Result<()> {
    println!(
        "{} {} sha256={} at {}",
        label.bright_green().bold(),
        file.display(),
        record.content_hash.dimmed(),
        record.timestamp
    );
    Ok(())
}

fn verify_all(ledger: &MeshLedger) -> Result<()> {
    let checks: [(&str, Result<()>); 4] = [
        ("Block chain", ledger.validate_chain()),
        ("Proof chain", ledger.validate_proof_chain()),
        ("Event log", ledger.validate_events()),
        ("Wallet balances", ledger.audit_balances()),
    ];

    let mut table = new_table(vec!["Check", "Result"]);
    let mut first_failure = None;
    for (name, outcome) in checks {
        match outcome {
            Ok(()) => {
                table.add_row(vec![name.to_string(), "ok".to_string()]);
            }
            Err(e) => {
                table.add_row(vec![name.to_string(), format!("{}: {}", e.kind(), e)]);
                first_failure.get_or_insert(e);
            }
        }
    }
    println!("{}", table);
    println!(
        "{} blocks, {} proofs, {} events",
        ledger.chain().len(),
        ledger.proof_chain().len(),
        ledger.events().len()
    );

    match first_failure {
        Some(e) => Err(e),
        None => {
            println!("{}", "Ledger verified".bright_green().bold());
            Ok(())
        }
    }
}

fn events(ledger: &MeshLedger, export: Option<&Path>) -> Result<()> {
    if let Some(path) = export {
        let file = File::create(path)?;
        export_jsonl(ledger.events(), BufWriter::new(file))?;
        println!(
            "{} {} events to {}",
            "Exported".bright_green().bold(),
            ledger.events().len(),
            path.display()
        );
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in ledger.events() {
        writeln!(
            out,
            "{} {:<22} {}",
            record.timestamp.to_string().dimmed(),
            record.event.bright_white(),
            record.data
        )?;
    }
    Ok(())
}

fn import_events(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let records = read_jsonl(BufReader::new(file))?;
    println!(
        "{} {} events in {}",
        "Verified".bright_green().bold(),
        records.len(),
        path.display()
    );
    Ok(())
}
