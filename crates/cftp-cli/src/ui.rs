//! UI utilities for the CFTP CLI.

use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::watch;

use cftp_core::file::format_size;
use cftp_core::session::TransferReport;
use cftp_core::transfer::{TransferProgress, TransferState};

/// Parse a duration string like "30s", "5m" or "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, scale) = if let Some(num_str) = s.strip_suffix('m') {
        (num_str, 60)
    } else if let Some(num_str) = s.strip_suffix('s') {
        (num_str, 1)
    } else if let Some(num_str) = s.strip_suffix('h') {
        (num_str, 3600)
    } else {
        return None;
    };

    let num: u64 = num_str.parse().ok()?;
    num.checked_mul(scale).map(Duration::from_secs)
}

/// Parse a byte size like "4096", "512K", "100M" or "2G" (binary units).
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last()?.to_ascii_uppercase() {
        'K' => (&s[..s.len() - 1], 10),
        'M' => (&s[..s.len() - 1], 20),
        'G' => (&s[..s.len() - 1], 30),
        'T' => (&s[..s.len() - 1], 40),
        _ => (s, 0),
    };

    let value: u64 = digits.trim().parse().ok()?;
    value.checked_mul(1u64 << shift)
}

/// Format an elapsed duration as "1m 05s" or "3.42s".
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

/// Render progress updates on one terminal line until the transfer ends.
pub async fn display_progress(mut rx: watch::Receiver<TransferProgress>) {
    let mut last_state = TransferState::Negotiating;

    loop {
        let changed = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;

        let progress = rx.borrow().clone();

        if progress.state != last_state {
            last_state = progress.state;

            match progress.state {
                TransferState::Transferring => {
                    println!("  Receiver accepted, sending {} chunks...", progress.total_chunks);
                }
                TransferState::Completed | TransferState::Failed => break,
                TransferState::Negotiating | TransferState::Verifying => {}
            }
        }

        if progress.state == TransferState::Transferring {
            let eta = progress
                .eta
                .map_or_else(|| "--".to_string(), |d| format!("{}s", d.as_secs()));
            let retries = if progress.retries > 0 {
                format!(" - {} retries", progress.retries)
            } else {
                String::new()
            };

            print!(
                "\r  [{:>6.2}%] {}/{} - {}/s - ETA: {}{}    ",
                progress.percentage(),
                format_size(progress.bytes_transferred),
                format_size(progress.total_bytes),
                format_size(progress.speed_bps),
                eta,
                retries
            );
            let _ = io::stdout().flush();
        }

        match changed {
            Err(_) | Ok(Ok(())) => {}
            Ok(Err(_)) => break,
        }
    }

    println!();
}

/// Print a finished transfer, as JSON or as a short human summary.
///
/// Failures are printed to stdout with their reason.
pub fn print_report(report: &TransferReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.success {
        println!(
            "  Transfer complete: {} ({}) in {}",
            report.filename,
            format_size(report.file_size),
            format_elapsed(report.elapsed)
        );
        if let Some(dest) = &report.destination {
            println!("  Saved to {}", dest.display());
        }
        if report.retries > 0 || report.resyncs > 0 {
            println!(
                "  {} retries, {} resyncs",
                report.retries, report.resyncs
            );
        }
    } else {
        let kind = report
            .error
            .as_ref()
            .map_or_else(|| "failure".to_string(), |e| e.kind.to_string());
        println!(
            "  Transfer failed ({}): {}",
            kind,
            report.failure_reason().unwrap_or("unknown error")
        );
    }

    Ok(())
}
