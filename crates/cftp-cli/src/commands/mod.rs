//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cftp_core::config::Config;

pub mod config;
pub mod send;
pub mod serve;

/// Load configuration.
///
/// An explicitly given file must exist and parse. Without one, the default
/// location is tried and any problem falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring configuration file: {}", e);
            Config::default()
        })),
    }
}

/// CFTP - Cluster File Transfer Protocol
#[derive(Parser)]
#[command(name = "cftp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "CFTP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send a file to a CFTP receiver
    Send(SendArgs),

    /// Receive files from CFTP senders
    Serve(ServeArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

impl Command {
    /// Whether the command asked for minimal or machine-readable output.
    pub const fn is_quiet(&self) -> bool {
        match self {
            Self::Send(args) => args.quiet || args.json,
            Self::Serve(args) => args.quiet || args.json,
            Self::Config(_) => false,
        }
    }
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Receiver host name or IP address
    pub server: String,

    /// Receiver TCP port
    pub port: u16,

    /// File to send
    pub filename: PathBuf,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Attempts per chunk before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Read/write timeout (e.g., 30s, 2m; 0s disables)
    #[arg(long)]
    pub timeout: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output the transfer report in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory received files are written to
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Largest accepted file (e.g., 500M, 2G)
    #[arg(long)]
    pub quota: Option<String>,

    /// Keep accepting clients after the first transfer
    #[arg(long)]
    pub multi: bool,

    /// Read/write timeout (e.g., 30s, 2m; 0s disables)
    #[arg(long)]
    pub timeout: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output one JSON report per transfer
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Parse a `--timeout` flag value.
fn parse_timeout(value: &str) -> Result<std::time::Duration> {
    crate::ui::parse_duration(value)
        .with_context(|| format!("Invalid timeout '{}', use e.g. 30s or 2m", value))
}
