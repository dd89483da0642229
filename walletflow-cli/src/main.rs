//! Walletflow CLI - wallet and UPI transaction batches in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod output;

use commands::{doctor, load, normalize, query, report, run, status};
use output::OutputFormat;

/// Walletflow - load, normalize and report on wallet transaction exports
#[derive(Parser)]
#[command(name = "wf", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a CSV export to the staging relation
    Load {
        /// Path to CSV file
        file: PathBuf,
        /// Clear staging before loading
        #[arg(long)]
        replace: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize staging into users, recipients and transactions
    Normalize {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run analytics reports
    ///
    /// Reports: summary, top-recipients, top-channel-apps, top-origin-states,
    /// hourly, cohort-spend, anomalies, corridors, age-brackets
    Report {
        /// Report name (all reports when omitted)
        name: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Load, normalize and run every report
    Run {
        /// Path to CSV file
        file: PathBuf,
        /// Clear staging before loading
        #[arg(long)]
        replace: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Show store status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report unresolved references and pending staging rows
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a read-only SQL query against the store
    Query {
        /// SQL query to execute
        sql: Option<String>,
        /// Read SQL from file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so JSON and CSV on stdout stay clean
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Load { file, replace, json } => load::run(&file, replace, json),
        Commands::Normalize { json } => normalize::run(json),
        Commands::Report { name, format, json } => {
            report::run(name.as_deref(), OutputFormat::resolve(format, json))
        }
        Commands::Run {
            file,
            replace,
            format,
            json,
        } => run::run(&file, replace, OutputFormat::resolve(format, json)),
        Commands::Status { json } => status::run(json),
        Commands::Doctor { json } => doctor::run(json),
        Commands::Query {
            sql,
            file,
            format,
            json,
        } => query::run(sql.as_deref(), file.as_deref(), OutputFormat::resolve(format, json)),
    }
}
