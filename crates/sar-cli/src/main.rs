//! # sar CLI entry point
//!
//! Parses command-line arguments, installs the tracing subscriber and
//! dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sar_cli::artefact::{run_artefact, ArtefactArgs};
use sar_cli::policy::{run_policy, PolicyArgs};
use sar_cli::serve::{run_serve, ServeArgs};

/// Simple Artefact Registry
///
/// Stores named, versioned binary artefacts at namespace/name/version
/// coordinates, gated by an optional bearer-token authorization policy.
#[derive(Parser, Debug)]
#[command(name = "sar", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP registry.
    Serve(ServeArgs),

    /// Local operations on a storage root (put, get, verify, list, delete).
    Artefact(ArtefactArgs),

    /// Authorization policy tools.
    Policy(PolicyArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The server logs its startup at info even without -v; RUST_LOG wins there.
    let serving = matches!(cli.command, Commands::Serve(_));
    let level = match (cli.verbose, serving) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    let filter = if serving {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "sar starting");

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Artefact(args) => run_artefact(args).await,
        Commands::Policy(args) => run_policy(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
