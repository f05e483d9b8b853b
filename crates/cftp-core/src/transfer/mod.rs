//! Chunk transfer engine.
//!
//! Moves the data chunks `0..num_chunks` of one negotiated file over a
//! [`Channel`]. Every chunk is one exchange: a DTF frame, the raw chunk
//! bytes, then a DAF from the receiver echoing the chunk index.
//!
//! ## Sender Policy
//!
//! - DAF for the current chunk: advance, reset the retry counter
//! - DAF for another valid chunk: resynchronize to the chunk after it,
//!   reset the retry counter (not charged as a retry)
//! - Anything else (timeout, malformed frame, wrong type or token, index
//!   out of range): retry the same chunk, up to `max_retries` DTFs in total
//!
//! Resyncs are capped at `max(num_chunks, 1) * max_retries` per transfer.
//!
//! ## Receiver Policy
//!
//! The receiver never resynchronizes. A DTF whose index differs from the
//! number of chunks already written aborts the transfer.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::connection::Channel;
use crate::error::{Error, Result};
use crate::file::{ChunkReader, ChunkWriter};
use crate::protocol::{Frame, MessageType, SessionParameters};

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Exchanging session parameters
    Negotiating,
    /// Moving chunks
    Transferring,
    /// Finish handshake and digest check
    Verifying,
    /// Transfer completed successfully
    Completed,
    /// Transfer failed
    Failed,
}

/// Progress information for a transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Current state
    pub state: TransferState,
    /// File being transferred
    pub filename: String,
    /// Total bytes in the file
    pub total_bytes: u64,
    /// Bytes acknowledged (sender) or written (receiver)
    pub bytes_transferred: u64,
    /// Total number of chunks
    pub total_chunks: u64,
    /// Chunks completed
    pub chunks_done: u64,
    /// Failed attempts so far
    pub retries: u32,
    /// Resynchronizations so far
    pub resyncs: u32,
    /// Transfer speed in bytes per second
    pub speed_bps: u64,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// When the transfer started
    pub started_at: Instant,
}

impl TransferProgress {
    /// Create a new progress tracker.
    pub fn new(filename: impl Into<String>, total_bytes: u64, total_chunks: u64) -> Self {
        Self {
            state: TransferState::Negotiating,
            filename: filename.into(),
            total_bytes,
            bytes_transferred: 0,
            total_chunks,
            chunks_done: 0,
            retries: 0,
            resyncs: 0,
            speed_bps: 0,
            eta: None,
            started_at: Instant::now(),
        }
    }

    /// Get progress as a percentage (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        }
    }

    fn record(&mut self, chunks_done: u64, bytes_transferred: u64, counters: &ChunkProgress) {
        self.chunks_done = chunks_done;
        self.bytes_transferred = bytes_transferred;
        self.retries = counters.total_retries;
        self.resyncs = counters.resyncs;

        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.speed_bps = (bytes_transferred as f64 / elapsed) as u64;
        }
        if self.speed_bps > 0 {
            let remaining = self.total_bytes.saturating_sub(bytes_transferred);
            self.eta = Some(Duration::from_secs(remaining / self.speed_bps));
        }
    }
}

/// Chunk cursor and retry bookkeeping of one session.
///
/// Only the engine moves the cursor or touches the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkProgress {
    current_chunk: u64,
    retry_count: u32,
    total_retries: u32,
    resyncs: u32,
}

impl ChunkProgress {
    /// Next chunk to send (sender) or expected (receiver).
    pub const fn current_chunk(&self) -> u64 {
        self.current_chunk
    }

    /// Failed attempts for the current chunk.
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Failed attempts across the whole transfer.
    pub const fn total_retries(&self) -> u32 {
        self.total_retries
    }

    /// Resynchronizations across the whole transfer.
    pub const fn resyncs(&self) -> u32 {
        self.resyncs
    }

    fn advance(&mut self) {
        self.current_chunk += 1;
        self.retry_count = 0;
    }

    fn resync(&mut self, acked: u64) {
        self.current_chunk = acked + 1;
        self.retry_count = 0;
        self.resyncs += 1;
    }

    fn fail_attempt(&mut self) {
        self.retry_count += 1;
        self.total_retries += 1;
    }
}

/// Drives the chunk phase of one session.
#[derive(Debug)]
pub struct ChunkTransferEngine<'a> {
    session_token: u8,
    params: &'a SessionParameters,
    max_retries: u32,
    progress: &'a watch::Sender<TransferProgress>,
}

impl<'a> ChunkTransferEngine<'a> {
    /// Engine for the session identified by `session_token`.
    pub fn new(
        session_token: u8,
        params: &'a SessionParameters,
        max_retries: u32,
        progress: &'a watch::Sender<TransferProgress>,
    ) -> Self {
        Self {
            session_token,
            params,
            max_retries: max_retries.max(1),
            progress,
        }
    }

    fn total_chunks(&self) -> u64 {
        u64::from(self.params.num_chunks)
    }

    fn resync_limit(&self) -> u32 {
        self.params.num_chunks.max(1).saturating_mul(self.max_retries)
    }

    fn bytes_before(&self, chunk: u64) -> u64 {
        chunk
            .saturating_mul(u64::from(self.params.chunk_size))
            .min(self.params.file_size)
    }

    fn publish(&self, chunk: &ChunkProgress) {
        let done = chunk.current_chunk;
        let bytes = self.bytes_before(done);
        self.progress.send_modify(|p| p.record(done, bytes, chunk));
    }

    /// Send every chunk from `chunk.current_chunk()` to the end.
    ///
    /// # Errors
    ///
    /// Returns `Error::RetryExhausted` when a chunk gets no valid DAF after
    /// `max_retries` attempts, `Error::ProtocolError` when the receiver
    /// forces more than `max(num_chunks, 1) * max_retries` resyncs,
    /// `Error::PeerClosed` or `Error::ConnectionClosed` when the receiver
    /// goes away, or an I/O error when the source file cannot be read.
    pub async fn send_chunks<S>(
        &self,
        channel: &mut Channel<S>,
        reader: &mut ChunkReader,
        chunk: &mut ChunkProgress,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let total = self.total_chunks();
        let data_size = u64::from(self.params.chunk_size);

        while chunk.current_chunk < total {
            let index = chunk.current_chunk;
            let data = reader.read_chunk(index).await?;

            tracing::debug!(
                "Sending chunk {}/{} ({} bytes, attempt {})",
                index + 1,
                total,
                data.len(),
                chunk.retry_count + 1
            );

            let outcome = self.exchange(channel, data_size, index, &data).await;

            let failure = match outcome {
                Ok(Frame::DataAck(ack))
                    if ack.session_token == self.session_token && ack.block_num < total =>
                {
                    if ack.block_num == index {
                        chunk.advance();
                    } else {
                        if chunk.resyncs >= self.resync_limit() {
                            return Err(Error::ProtocolError(format!(
                                "receiver forced more than {} resynchronizations",
                                chunk.resyncs
                            )));
                        }
                        chunk.resync(ack.block_num);
                        tracing::warn!(
                            "Receiver acked chunk {} with chunk {} in flight, resuming at {}",
                            ack.block_num,
                            index,
                            chunk.current_chunk
                        );
                    }
                    self.publish(chunk);
                    continue;
                }
                Ok(Frame::SessionClose(close)) => {
                    return Err(Error::PeerClosed(format!(
                        "receiver closed the session during chunk {index}: {}",
                        close.error_code
                    )));
                }
                Ok(Frame::DataAck(ack)) => format!(
                    "invalid DAF (token {}, chunk {})",
                    ack.session_token, ack.block_num
                ),
                Ok(other) => format!("expected DAF, got {}", other.message_type()),
                Err(e) if e.is_connection_closed() => return Err(e),
                Err(e) => e.to_string(),
            };

            chunk.fail_attempt();
            self.publish(chunk);
            tracing::warn!(
                "Chunk {} attempt {}/{} failed: {}",
                index,
                chunk.retry_count,
                self.max_retries,
                failure
            );

            if chunk.retry_count >= self.max_retries {
                return Err(Error::RetryExhausted {
                    chunk: index,
                    attempts: chunk.retry_count,
                });
            }
        }

        tracing::debug!("All {} chunks acknowledged", total);
        Ok(())
    }

    async fn exchange<S>(
        &self,
        channel: &mut Channel<S>,
        data_size: u64,
        index: u64,
        data: &[u8],
    ) -> Result<Frame>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        channel
            .send_frame(&Frame::data_transfer(self.session_token, data_size, index))
            .await?;
        channel.send_payload(data).await?;
        channel.recv_frame().await
    }

    /// Receive chunks until `num_chunks` have been written.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfOrderChunk` for a DTF with an unexpected index,
    /// `Error::TokenMismatch` for a foreign token, or an I/O error when
    /// the destination cannot be written.
    pub async fn recv_chunks<S>(
        &self,
        channel: &mut Channel<S>,
        writer: &mut ChunkWriter,
        chunk: &mut ChunkProgress,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let total = self.total_chunks();

        while chunk.current_chunk < total {
            let expected = chunk.current_chunk;
            let dtf = match channel.recv_frame().await? {
                Frame::DataTransfer(dtf) => dtf,
                Frame::SessionClose(close) => {
                    return Err(Error::PeerClosed(format!(
                        "sender closed the session: {}",
                        close.error_code
                    )));
                }
                other => {
                    return Err(Error::UnexpectedMessage {
                        expected: MessageType::DataTransfer,
                        actual: other.message_type(),
                    });
                }
            };

            if dtf.session_token != self.session_token {
                return Err(Error::TokenMismatch {
                    expected: self.session_token,
                    actual: dtf.session_token,
                });
            }
            if dtf.block_num != expected {
                return Err(Error::OutOfOrderChunk {
                    expected,
                    actual: dtf.block_num,
                });
            }

            let len = self.params.chunk_len(expected);
            if dtf.data_size < len as u64 {
                return Err(Error::ProtocolError(format!(
                    "chunk {expected} announced {} bytes, {len} required",
                    dtf.data_size
                )));
            }

            let data = channel.recv_payload(len).await?;
            writer.write_chunk(&data).await?;
            channel
                .send_frame(&Frame::data_ack(self.session_token, dtf.block_num))
                .await?;

            chunk.advance();
            self.publish(chunk);
            tracing::debug!("Received chunk {}/{} ({} bytes)", expected + 1, total, len);
        }

        Ok(())
    }

    /// Wait for the sender's FFF after the last chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedMessage` for any other frame kind.
    pub async fn await_finish<S>(&self, channel: &mut Channel<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match channel.recv_frame().await? {
            Frame::FileFinish(fff) if fff.session_token == self.session_token => Ok(()),
            Frame::FileFinish(fff) => Err(Error::TokenMismatch {
                expected: self.session_token,
                actual: fff.session_token,
            }),
            Frame::SessionClose(close) => Err(Error::PeerClosed(format!(
                "sender closed the session: {}",
                close.error_code
            ))),
            other => Err(Error::UnexpectedMessage {
                expected: MessageType::FileFinish,
                actual: other.message_type(),
            }),
        }
    }
}
