//! forkstore CLI
//!
//! Inspects and verifies export directories written by
//! `StateManager::export`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use forkstore::export::{self, ExportManifest};
use forkstore::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// forkstore CLI
#[derive(Parser, Debug)]
#[command(name = "forkstore")]
#[command(about = "Inspect forkstore pipeline exports")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List branches and their ledgers
    Inspect {
        /// Export directory
        dir: PathBuf,

        /// Only show this branch
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Check ledger chains and the root payload hash
    Verify {
        /// Export directory
        dir: PathBuf,
    },

    /// Print the exported pipeline configuration
    Config {
        /// Export directory
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forkstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let outcome = match args.command {
        Commands::Inspect { dir, branch } => inspect(&dir, branch.as_deref()),
        Commands::Verify { dir } => verify(&dir),
        Commands::Config { dir } => print_config(&dir),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn inspect(dir: &Path, only: Option<&str>) -> Result<bool> {
    let manifest = ExportManifest::read(dir)?;

    println!("exported:  {}", manifest.exported_at.to_rfc3339());
    println!("root:      {}", manifest.root_branch);
    println!("active:    {}", manifest.active_branch);
    if let Some(info) = &manifest.root_payload {
        println!(
            "payload:   {} ({} rows x {} cols, {})",
            info.state_id, info.row_count, info.column_count, info.content_hash
        );
    }

    for (name, branch) in &manifest.branches {
        if only.is_some_and(|b| b != name.as_str()) {
            continue;
        }

        println!();
        match &branch.forked_from {
            Some(fork) => println!("[{}] forked from {}::{}", name, fork.branch, fork.state_id),
            None => println!("[{}]", name),
        }
        for record in branch.ledger.records() {
            println!(
                "  {:>3}  {:<24} {:>8} rows {:>4} cols  {}  {}",
                record.position,
                record.id,
                record.row_count,
                record.column_count,
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.delta_summary
            );
        }
    }

    if let Some(name) = only {
        if manifest.branch(name).is_none() {
            eprintln!("no branch named '{}'", name);
            return Ok(false);
        }
    }
    Ok(true)
}

fn verify(dir: &Path) -> Result<bool> {
    let report = export::verify_artifact(dir)?;

    println!("branches:      {}", report.branches);
    println!("records:       {}", report.records);
    match report.root_payload_ok {
        Some(true) => println!("root payload:  ok"),
        Some(false) => println!("root payload:  MISMATCH"),
        None => println!("root payload:  absent"),
    }
    for name in &report.broken_chains {
        println!("broken chain:  {}", name);
    }

    Ok(report.is_ok())
}

fn print_config(dir: &Path) -> Result<bool> {
    let config = export::read_pipeline_config(dir)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(true)
}
