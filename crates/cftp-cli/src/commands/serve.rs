//! Serve command implementation.
//!
//! Listens for senders and writes each received file into the transfer
//! directory, one client at a time.

use anyhow::{Context, Result};

use cftp_core::config::{ClientMode, Config};
use cftp_core::file::format_size;
use cftp_core::server::Server;

use super::ServeArgs;
use crate::ui;

/// Run the serve command. Returns whether every transfer succeeded.
pub async fn run(args: ServeArgs, mut config: Config) -> Result<bool> {
    apply_overrides(&args, &mut config)?;
    config.validate().context("Invalid settings")?;

    let server = Server::bind(&config).with_context(|| {
        format!(
            "Failed to listen on {}:{}",
            config.network.host, config.network.port
        )
    })?;
    let addr = server.local_addr()?;

    if !args.quiet && !args.json {
        println!();
        println!("CFTP v{}", cftp_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Listening on {}", addr);
        println!("  Saving to {}", config.server.transfer_dir.display());
        if let Some(quota) = config.server.quota {
            println!("  Quota {}", format_size(quota));
        }
        if config.server.client_mode == ClientMode::Multi {
            println!("  Accepting clients until interrupted");
        }
        println!();
    }

    let mut all_ok = true;
    let mut print_error = None;
    let json = args.json;
    let quiet = args.quiet;

    server
        .run(|peer, report| {
            all_ok &= report.success;
            if quiet && report.success {
                return;
            }
            if !json {
                println!("  From {}:", peer);
            }
            if let Err(e) = ui::print_report(report, json) {
                print_error.get_or_insert(e);
            }
        })
        .await
        .context("Failed to accept connection")?;

    if let Some(e) = print_error {
        return Err(e);
    }
    Ok(all_ok)
}

fn apply_overrides(args: &ServeArgs, config: &mut Config) -> Result<()> {
    if let Some(host) = &args.host {
        config.network.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(dir) = &args.dir {
        config.server.transfer_dir.clone_from(dir);
    }
    if let Some(quota) = &args.quota {
        let bytes = ui::parse_size(quota)
            .with_context(|| format!("Invalid quota '{}', use e.g. 500M or 2G", quota))?;
        config.server.quota = Some(bytes);
    }
    if args.multi {
        config.server.client_mode = ClientMode::Multi;
    }
    if let Some(timeout) = &args.timeout {
        config.transfer.read_timeout = super::parse_timeout(timeout)?;
    }
    Ok(())
}
