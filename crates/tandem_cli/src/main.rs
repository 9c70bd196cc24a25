//! TANDEM CLI
//!
//! Runs JSON composition plans of simulated requestors.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::bail;
use std::path::PathBuf;
use std::time::Duration;
use tandem_cli::{Plan, run_local, run_tokio};
use tandem_runtime::LocalLoop;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "TANDEM - requestor combinators on a single-threaded event loop", long_about = None)]
struct Cli {
    /// Log filter directive, overriding RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan
    Run {
        /// Path to plan file
        #[arg(short, long)]
        file: PathBuf,
        /// Initial input as JSON
        #[arg(short, long, default_value = "null")]
        input: String,
        /// Run on tokio in wall-clock time instead of the virtual clock
        #[arg(long = "tokio")]
        on_tokio: bool,
        /// How long to wait for a tokio run to settle
        #[arg(long, default_value_t = 60_000)]
        patience_ms: u64,
    },
    /// Check a plan without running it
    Check {
        /// Path to plan file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tandem=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {
        Commands::Run { file, input, on_tokio, patience_ms } => {
            let plan = Plan::load(&file)?;
            let input: serde_json::Value = serde_json::from_str(&input)?;

            let report = if on_tokio {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, run_tokio(&plan, input, Duration::from_millis(patience_ms)))?
            } else {
                run_local(&plan, input)?
            };

            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            if !report.is_success() {
                bail!("plan {} did not succeed", file.display());
            }
            Ok(())
        }
        Commands::Check { file } => {
            let plan = Plan::load(&file)?;
            plan.build(&LocalLoop::new().host())?;
            println!("Plan ok: {} leaves", plan.leaves());
            Ok(())
        }
    }
}
