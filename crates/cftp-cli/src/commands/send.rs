//! Send command implementation.
//!
//! Connects to a receiver, announces the file and streams it chunk by chunk.

use anyhow::{Context, Result};

use cftp_core::config::Config;
use cftp_core::connection::{self, Channel};
use cftp_core::file::{format_size, FileRecord};
use cftp_core::session::SenderSession;

use super::SendArgs;
use crate::ui;

/// Run the send command. Returns whether the transfer succeeded.
pub async fn run(args: SendArgs, mut config: Config) -> Result<bool> {
    apply_overrides(&args, &mut config)?;
    config.validate().context("Invalid settings")?;

    let record = FileRecord::from_path(&args.filename, config.transfer.chunk_size)
        .await
        .with_context(|| format!("Cannot send {}", args.filename.display()))?;

    let addr = connection::resolve(&args.server, args.port).await?;
    let show_progress = !args.quiet && !args.json;

    if show_progress {
        println!();
        println!("CFTP v{}", cftp_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!(
            "  Sending {} ({}, {} chunks of {}) to {}",
            record.filename(),
            format_size(record.params.file_size),
            record.params.num_chunks,
            format_size(u64::from(record.params.chunk_size)),
            addr
        );
        println!();
    }

    let stream = connection::connect(addr, config.network.connect_timeout)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let channel = Channel::new(stream, config.transfer.io_timeout());

    let mut session =
        SenderSession::new(channel, record).with_max_retries(config.transfer.max_retries);

    let progress_handle =
        show_progress.then(|| tokio::spawn(ui::display_progress(session.progress())));

    let report = session.run().await;
    drop(session);

    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    ui::print_report(&report, args.json)?;
    Ok(report.success)
}

fn apply_overrides(args: &SendArgs, config: &mut Config) -> Result<()> {
    if let Some(chunk_size) = args.chunk_size {
        config.transfer.chunk_size = chunk_size;
    }
    if let Some(max_retries) = args.max_retries {
        config.transfer.max_retries = max_retries;
    }
    if let Some(timeout) = &args.timeout {
        config.transfer.read_timeout = super::parse_timeout(timeout)?;
    }
    Ok(())
}
