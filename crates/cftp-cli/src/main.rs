//! CFTP CLI - Cluster File Transfer Protocol sender and receiver
//!
//! Moves one file at a time over TCP with per-chunk acknowledgment and a
//! whole-file SHA-1 check at the end.
//!
//! ## Quick Start
//!
//! ```bash
//! # Receive files into ./incoming (on the server)
//! cftp serve --dir ./incoming
//!
//! # Send a file (on the client)
//! cftp send 10.0.0.5 9400 ./dataset.tar
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use std::process::ExitCode;

use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.command.is_quiet());

    let result = match cli.command {
        Command::Send(args) => match commands::load_config(cli.config.as_deref()) {
            Ok(config) => commands::send::run(args, config).await,
            Err(e) => Err(e),
        },
        Command::Serve(args) => match commands::load_config(cli.config.as_deref()) {
            Ok(config) => commands::serve::run(args, config).await,
            Err(e) => Err(e),
        },
        Command::Config(args) => commands::config::run(args, cli.config.as_deref()).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,cftp=debug,cftp_core=debug"
    } else if quiet {
        "warn"
    } else {
        "warn,cftp=info,cftp_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
