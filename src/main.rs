//! Binary entry point for fire-migrate.
//!
//! This binary provides the CLI for importing files into a document
//! database and exporting collections out of it.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use commands::{ExportArgs, ImportArgs};
use fire_migrate::config::MigrateConfig;
use fire_migrate::observability::{self, InitOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// fire-migrate - Import and export document database collections.
#[derive(Parser)]
#[command(name = "fire-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import a JSON, CSV or XLSX file into collections.
    #[command(alias = "i")]
    Import(ImportArgs),

    /// Export collections to a JSON, CSV or XLSX file.
    #[command(alias = "e")]
    Export(ExportArgs),
}

impl Commands {
    const fn verbose(&self) -> bool {
        match self {
            Self::Import(args) => args.verbose || args.dry_run,
            Self::Export(args) => args.verbose,
        }
    }
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match MigrateConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_config(
        &config.logging,
        InitOptions {
            verbose: cli.command.verbose(),
        },
    ) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &MigrateConfig) -> fire_migrate::Result<()> {
    match command {
        Commands::Import(args) => commands::cmd_import(config, args),
        Commands::Export(args) => commands::cmd_export(config, args),
    }
}
