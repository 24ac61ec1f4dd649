//! Entry point for the Umbra CLI, a C source-to-source obfuscator.
//!
//! This module parses command-line arguments and dispatches to subcommands
//! for obfuscating a translation unit, dumping per-function control flow
//! graphs, or re-emitting parsed source. It initializes logging and handles
//! the main execution flow.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Cmd, Command};

/// Command-line interface for Umbra.
///
/// Umbra is a C source obfuscator that supports control-flow flattening,
/// string literal encryption, Graphviz CFG dumps, and re-emission of parsed
/// source for front-end debugging.
#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "Umbra: C source obfuscator")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the Umbra CLI with the provided arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
