//! Sender (client) session.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use super::{unexpected_frame, Outcome, Phase, Role, SessionState, Signal, TransferReport};
use crate::connection::Channel;
use crate::error::{Error, Result};
use crate::file::{ChunkReader, FileRecord};
use crate::protocol::{
    ErrorCode, Frame, MessageType, ParameterFormat, SessionInitFrame, SessionParameters,
    SIMPLE_PARAMETERS_LEN,
};
use crate::transfer::{ChunkTransferEngine, TransferProgress, TransferState};

/// States of the sender state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderState {
    /// Send SIF and the parameter payload, wait for SAF
    SendSessionParameters,
    /// Read and check the parameter echo following SAF
    RecvSessionAck,
    /// Send SRF
    SendClientReady,
    /// Run the chunk engine
    SendDataBlocks,
    /// Send FFF, wait for FAF
    RecvFileFinishAck,
    /// Log the failure
    UnknownError,
    /// Best-effort SCF, then close
    SendSessionClose,
    /// Terminal
    Done(Outcome),
}

impl SenderState {
    /// Lifecycle phase of this state.
    pub const fn phase(self) -> Phase {
        match self {
            Self::SendSessionParameters | Self::RecvSessionAck | Self::SendClientReady => {
                Phase::Negotiation
            }
            Self::SendDataBlocks => Phase::Transfer,
            Self::RecvFileFinishAck
            | Self::UnknownError
            | Self::SendSessionClose
            | Self::Done(_) => Phase::Teardown,
        }
    }

    /// Whether the session loop stops here.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done(_))
    }

    const fn expected_frame(self) -> Option<MessageType> {
        match self {
            Self::SendSessionParameters => Some(MessageType::SessionAck),
            Self::RecvFileFinishAck => Some(MessageType::FileFinishAck),
            _ => None,
        }
    }

    /// Next state given the outcome of this state's action.
    pub fn transition(self, outcome: &Result<Signal>) -> Self {
        match (self, outcome) {
            (Self::Done(done), _) => Self::Done(done),
            (Self::SendSessionClose, _) => Self::Done(Outcome::Failure),
            (Self::UnknownError, _) => Self::SendSessionClose,
            (Self::SendSessionParameters, Ok(Signal::Received(MessageType::SessionAck))) => {
                Self::RecvSessionAck
            }
            (Self::RecvSessionAck, Ok(Signal::Proceed)) => Self::SendClientReady,
            (Self::SendClientReady, Ok(Signal::Proceed)) => Self::SendDataBlocks,
            (Self::SendDataBlocks, Ok(Signal::Proceed)) => Self::RecvFileFinishAck,
            (Self::RecvFileFinishAck, Ok(Signal::Received(MessageType::FileFinishAck))) => {
                Self::Done(Outcome::Success)
            }
            _ => Self::UnknownError,
        }
    }
}

/// Client side of one transfer.
#[derive(Debug)]
pub struct SenderSession<S> {
    channel: Channel<S>,
    record: FileRecord,
    max_retries: u32,
    state: SessionState<SenderState>,
    ack: Option<SessionInitFrame>,
    peer_closed: bool,
    visited: Vec<SenderState>,
    progress_tx: watch::Sender<TransferProgress>,
    progress_rx: watch::Receiver<TransferProgress>,
}

impl<S> SenderSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Prepare to send `record` over `channel` with a random session token.
    pub fn new(channel: Channel<S>, record: FileRecord) -> Self {
        let mut state = SessionState::new(
            Role::Sender,
            SenderState::SendSessionParameters,
            rand::random(),
        );
        state.params = Some(record.params.clone());

        let progress = TransferProgress::new(
            record.params.filename.clone(),
            record.params.file_size,
            u64::from(record.params.num_chunks),
        );
        let (progress_tx, progress_rx) = watch::channel(progress);

        Self {
            channel,
            record,
            max_retries: crate::MAX_RETRIES,
            state,
            ack: None,
            peer_closed: false,
            visited: Vec::new(),
            progress_tx,
            progress_rx,
        }
    }

    /// Override the per-chunk attempt limit.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Use a fixed session token instead of a random one.
    #[must_use]
    pub fn with_session_token(mut self, token: u8) -> Self {
        self.state.session_token = token;
        self
    }

    /// Subscribe to progress updates.
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress_rx.clone()
    }

    /// Current session state.
    pub const fn state(&self) -> &SessionState<SenderState> {
        &self.state
    }

    /// States entered so far, in order.
    pub fn visited(&self) -> &[SenderState] {
        &self.visited
    }

    /// Drive the session to a terminal state.
    pub async fn run(&mut self) -> TransferReport {
        let started = Instant::now();
        self.progress_tx.send_modify(|p| {
            p.state = TransferState::Negotiating;
            p.started_at = started;
        });

        while !self.state.state.is_terminal() {
            let current = self.state.state;
            self.state.phase = current.phase();
            self.visited.push(current);

            let outcome = self.act(current).await;
            if let Err(e) = &outcome {
                self.state.record(e);
            }

            let next = current.transition(&outcome);
            if next == SenderState::UnknownError && current != SenderState::UnknownError {
                if let Some(err) = unexpected_frame(current.expected_frame(), &outcome) {
                    self.state.record(&err);
                }
            }

            tracing::trace!("Sender {:?} -> {:?}", current, next);
            self.state.state = next;
        }

        let done = self.state.state;
        self.state.phase = done.phase();
        self.visited.push(done);

        let success = done == SenderState::Done(Outcome::Success);
        self.progress_tx.send_modify(|p| {
            p.state = if success {
                TransferState::Completed
            } else {
                TransferState::Failed
            };
        });

        if success {
            tracing::info!(
                "Sent {} ({} bytes) in {:.2?}",
                self.record.filename(),
                self.record.params.file_size,
                started.elapsed()
            );
        }

        TransferReport::from_state(&self.state, success, None, started.elapsed())
    }

    async fn act(&mut self, state: SenderState) -> Result<Signal> {
        match state {
            SenderState::SendSessionParameters => self.send_session_parameters().await,
            SenderState::RecvSessionAck => self.recv_session_ack().await,
            SenderState::SendClientReady => {
                self.channel
                    .send_frame(&Frame::session_ready(self.state.session_token))
                    .await?;
                Ok(Signal::Proceed)
            }
            SenderState::SendDataBlocks => self.send_data_blocks().await,
            SenderState::RecvFileFinishAck => self.recv_file_finish_ack().await,
            SenderState::UnknownError => {
                if let Some(error) = &self.state.last_error {
                    tracing::error!(
                        "Transfer of {} failed: {}",
                        self.record.filename(),
                        error.message
                    );
                }
                Ok(Signal::Proceed)
            }
            SenderState::SendSessionClose => {
                self.close().await;
                Ok(Signal::Proceed)
            }
            SenderState::Done(_) => Ok(Signal::Proceed),
        }
    }

    fn closed_by_peer(&mut self, code: ErrorCode) -> Error {
        self.peer_closed = true;
        match code {
            ErrorCode::UnknownFormat
            | ErrorCode::Overloaded
            | ErrorCode::DuplicateSessionToken
            | ErrorCode::MissingParameter
            | ErrorCode::UnacceptableParameters
            | ErrorCode::NoDiskSpace => Error::AdmissionRejected {
                code,
                reason: "refused by receiver".to_string(),
            },
            _ => Error::PeerClosed(format!("receiver closed the session: {code}")),
        }
    }

    fn check_token(&self, token: u8) -> Result<()> {
        if token == self.state.session_token {
            Ok(())
        } else {
            Err(Error::TokenMismatch {
                expected: self.state.session_token,
                actual: token,
            })
        }
    }

    async fn send_session_parameters(&mut self) -> Result<Signal> {
        let params = &self.record.params;
        let sif = Frame::SessionInit(SessionInitFrame {
            error_code: ErrorCode::NoError,
            session_token: self.state.session_token,
            parameter_format: ParameterFormat::Simple as u16,
            parameter_length: SIMPLE_PARAMETERS_LEN as u16,
        });

        self.channel.send_frame(&sif).await?;
        self.channel.send_payload(&params.encode()).await?;
        tracing::info!(
            "Announced {} ({} bytes, {} chunks of {} bytes)",
            params.filename,
            params.file_size,
            params.num_chunks,
            params.chunk_size
        );

        match self.channel.recv_frame().await? {
            Frame::SessionAck(saf) => {
                self.check_token(saf.session_token)?;
                if saf.error_code != ErrorCode::NoError {
                    return Err(self.closed_by_peer(saf.error_code));
                }
                self.ack = Some(saf);
                Ok(Signal::Received(MessageType::SessionAck))
            }
            Frame::SessionClose(scf) => Err(self.closed_by_peer(scf.error_code)),
            other => Ok(Signal::Received(other.message_type())),
        }
    }

    async fn recv_session_ack(&mut self) -> Result<Signal> {
        let saf = self
            .ack
            .ok_or_else(|| Error::ProtocolError("no SAF to read parameters from".to_string()))?;

        if ParameterFormat::from_u16(saf.parameter_format) != Some(ParameterFormat::Simple)
            || usize::from(saf.parameter_length) != SIMPLE_PARAMETERS_LEN
        {
            return Err(Error::ProtocolError(format!(
                "SAF announced format {} with {} bytes",
                saf.parameter_format, saf.parameter_length
            )));
        }

        let echo = self.channel.recv_payload(SIMPLE_PARAMETERS_LEN).await?;
        let accepted = SessionParameters::decode(&echo)?;
        if accepted != self.record.params {
            return Err(Error::ProtocolError(
                "receiver acknowledged different session parameters".to_string(),
            ));
        }

        tracing::debug!("Receiver accepted session {}", self.state.session_token);
        Ok(Signal::Proceed)
    }

    async fn send_data_blocks(&mut self) -> Result<Signal> {
        self.progress_tx
            .send_modify(|p| p.state = TransferState::Transferring);

        let mut reader = ChunkReader::open(&self.record).await?;
        let engine = ChunkTransferEngine::new(
            self.state.session_token,
            &self.record.params,
            self.max_retries,
            &self.progress_tx,
        );
        engine
            .send_chunks(&mut self.channel, &mut reader, &mut self.state.chunk)
            .await?;

        Ok(Signal::Proceed)
    }

    async fn recv_file_finish_ack(&mut self) -> Result<Signal> {
        self.progress_tx
            .send_modify(|p| p.state = TransferState::Verifying);

        self.channel
            .send_frame(&Frame::file_finish(self.state.session_token))
            .await?;

        match self.channel.recv_frame().await? {
            Frame::FileFinishAck(faf) => {
                self.check_token(faf.session_token)?;
                Ok(Signal::Received(MessageType::FileFinishAck))
            }
            Frame::SessionClose(scf) => Err(self.closed_by_peer(scf.error_code)),
            other => Ok(Signal::Received(other.message_type())),
        }
    }

    async fn close(&mut self) {
        let code = self.state.last_error.as_ref().and_then(|e| e.close_code);
        if let (false, Some(code)) = (self.peer_closed, code) {
            let scf = Frame::session_close(self.state.session_token, code);
            if let Err(e) = self.channel.send_frame(&scf).await {
                tracing::debug!("Could not send SCF: {}", e);
            }
        }
        self.channel.close().await;
    }
}
