//! Sequential receiver loop.
//!
//! Accepts one TCP connection at a time and runs a [`ReceiverSession`] on
//! it to completion before accepting the next. In single-client mode the
//! server stops after the first session.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{ClientMode, Config};
use crate::connection::{self, Channel};
use crate::error::Result;
use crate::session::{QuotaPolicy, ReceiverSession, TransferReport};

/// A bound CFTP receiver.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    transfer_dir: PathBuf,
    policy: QuotaPolicy,
    io_timeout: Option<Duration>,
    client_mode: ClientMode,
}

impl Server {
    /// Bind according to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address is invalid or cannot be bound.
    pub fn bind(config: &Config) -> Result<Self> {
        let listener = connection::listen(config.listen_addr()?)?;

        Ok(Self {
            listener,
            transfer_dir: config.server.transfer_dir.clone(),
            policy: config.server.admission_policy(),
            io_timeout: config.transfer.io_timeout(),
            client_mode: config.server.client_mode,
        })
    }

    /// Address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one client and run its session.
    ///
    /// # Errors
    ///
    /// Returns an error only if accepting the connection fails; session
    /// failures are reported in the returned [`TransferReport`].
    pub async fn serve_one(&self) -> Result<(SocketAddr, TransferReport)> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = connection::configure_stream(&stream) {
            tracing::warn!("Could not configure socket for {}: {}", peer, e);
        }
        tracing::info!("Client connected from {}", peer);

        let channel = Channel::new(stream, self.io_timeout);
        let mut session = ReceiverSession::new(channel, self.transfer_dir.clone(), self.policy);
        let report = session.run().await;

        if report.success {
            tracing::info!("Transfer from {} complete", peer);
        } else {
            tracing::warn!(
                "Transfer from {} failed: {}",
                peer,
                report.failure_reason().unwrap_or("unknown error")
            );
        }

        Ok((peer, report))
    }

    /// Serve clients according to the configured [`ClientMode`].
    ///
    /// `on_report` is called after every session. In single-client mode
    /// this returns after the first session; in multi-client mode it runs
    /// until accepting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn run<F>(&self, mut on_report: F) -> Result<()>
    where
        F: FnMut(SocketAddr, &TransferReport),
    {
        tracing::info!(
            "Receiving into {} on {}",
            self.transfer_dir.display(),
            self.local_addr()?
        );

        loop {
            let (peer, report) = self.serve_one().await?;
            on_report(peer, &report);

            if self.client_mode == ClientMode::Single {
                return Ok(());
            }
        }
    }
}
