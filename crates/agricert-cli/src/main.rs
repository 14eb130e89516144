//! # agricert CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agricert_cli::document::{run_checksum, run_verify, ChecksumArgs, VerifyArgs};
use agricert_cli::keys::{run_keygen, KeygenArgs};
use agricert_cli::template::{run_template, TemplateArgs};

/// AgriCert CLI: offline tooling for export quality credentials.
#[derive(Parser, Debug)]
#[command(name = "agricert", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an Ed25519 issuing key.
    Keygen(KeygenArgs),

    /// Check structure, signature and expiry of a signed credential.
    Verify(VerifyArgs),

    /// Compute or compare the QR integrity checksum of a document.
    Checksum(ChecksumArgs),

    /// Print the effective credential template.
    Template(TemplateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Keygen(args) => run_keygen(&args),
        Commands::Verify(args) => run_verify(&args),
        Commands::Checksum(args) => run_checksum(&args),
        Commands::Template(args) => run_template(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
