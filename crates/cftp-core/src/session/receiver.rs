//! Receiver (server) session.

use std::path::PathBuf;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use super::{
    unexpected_frame, AdmissionPolicy, Outcome, Phase, Rejection, Role, SessionState, Signal,
    TransferReport,
};
use crate::connection::Channel;
use crate::crypto;
use crate::error::{Error, Result};
use crate::file::{self, ChunkWriter, FileRecord, HashStatus};
use crate::protocol::{
    DecodeError, ErrorCode, Frame, MessageType, ParameterFormat, SessionInitFrame,
    SessionParameters, SIMPLE_PARAMETERS_LEN,
};
use crate::transfer::{ChunkTransferEngine, TransferProgress, TransferState};

/// States of the receiver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverState {
    /// Wait for SIF and its parameter payload
    RecvSessionParameters,
    /// Validate format, payload and local admission policy
    CheckSessionParameters,
    /// Send SAF with the parameter echo, wait for SRF
    AckSessionParameters,
    /// Open the destination file
    RecvClientReady,
    /// Run the chunk engine
    RecvDataBlocks,
    /// Wait for FFF
    RecvFileFinish,
    /// Verify the digest, send FAF on match
    AckFileFinish,
    /// Log the failure
    UnknownError,
    /// Best-effort SCF, then close
    SendSessionClose,
    /// Terminal
    Done(Outcome),
}

impl ReceiverState {
    /// Lifecycle phase of this state.
    pub const fn phase(self) -> Phase {
        match self {
            Self::RecvSessionParameters
            | Self::CheckSessionParameters
            | Self::AckSessionParameters
            | Self::RecvClientReady => Phase::Negotiation,
            Self::RecvDataBlocks => Phase::Transfer,
            Self::RecvFileFinish
            | Self::AckFileFinish
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
            Self::RecvSessionParameters => Some(MessageType::SessionInit),
            Self::AckSessionParameters => Some(MessageType::SessionReady),
            Self::RecvFileFinish => Some(MessageType::FileFinish),
            _ => None,
        }
    }

    /// Next state given the outcome of this state's action.
    ///
    /// A refused transfer goes straight to `SendSessionClose`, which
    /// carries the refusal code to the sender.
    pub fn transition(self, outcome: &Result<Signal>) -> Self {
        match (self, outcome) {
            (Self::Done(done), _) => Self::Done(done),
            (Self::SendSessionClose, _) => Self::Done(Outcome::Failure),
            (Self::UnknownError, _) => Self::SendSessionClose,
            (Self::RecvSessionParameters, Ok(Signal::Received(MessageType::SessionInit))) => {
                Self::CheckSessionParameters
            }
            (Self::CheckSessionParameters, Ok(Signal::Proceed)) => Self::AckSessionParameters,
            (Self::CheckSessionParameters, Ok(Signal::Rejected(_))) => Self::SendSessionClose,
            (Self::AckSessionParameters, Ok(Signal::Received(MessageType::SessionReady))) => {
                Self::RecvClientReady
            }
            (Self::RecvClientReady, Ok(Signal::Proceed)) => Self::RecvDataBlocks,
            (Self::RecvDataBlocks, Ok(Signal::Proceed)) => Self::RecvFileFinish,
            (Self::RecvFileFinish, Ok(Signal::Received(MessageType::FileFinish))) => {
                Self::AckFileFinish
            }
            (Self::AckFileFinish, Ok(Signal::Proceed)) => Self::Done(Outcome::Success),
            _ => Self::UnknownError,
        }
    }
}

/// Server side of one transfer.
#[derive(Debug)]
pub struct ReceiverSession<S, P> {
    channel: Channel<S>,
    transfer_dir: PathBuf,
    policy: P,
    state: SessionState<ReceiverState>,
    request: Option<(SessionInitFrame, Vec<u8>)>,
    record: Option<FileRecord>,
    writer: Option<ChunkWriter>,
    peer_closed: bool,
    visited: Vec<ReceiverState>,
    progress_tx: watch::Sender<TransferProgress>,
    progress_rx: watch::Receiver<TransferProgress>,
}

impl<S, P> ReceiverSession<S, P>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: AdmissionPolicy,
{
    /// Prepare to receive one file into `transfer_dir`.
    pub fn new(channel: Channel<S>, transfer_dir: impl Into<PathBuf>, policy: P) -> Self {
        let (progress_tx, progress_rx) = watch::channel(TransferProgress::new(String::new(), 0, 0));

        Self {
            channel,
            transfer_dir: transfer_dir.into(),
            policy,
            state: SessionState::new(Role::Receiver, ReceiverState::RecvSessionParameters, 0),
            request: None,
            record: None,
            writer: None,
            peer_closed: false,
            visited: Vec::new(),
            progress_tx,
            progress_rx,
        }
    }

    /// Subscribe to progress updates.
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress_rx.clone()
    }

    /// Current session state.
    pub const fn state(&self) -> &SessionState<ReceiverState> {
        &self.state
    }

    /// States entered so far, in order.
    pub fn visited(&self) -> &[ReceiverState] {
        &self.visited
    }

    /// The file record, once parameters were accepted.
    pub const fn record(&self) -> Option<&FileRecord> {
        self.record.as_ref()
    }

    /// Drive the session to a terminal state.
    pub async fn run(&mut self) -> TransferReport {
        let started = Instant::now();
        self.progress_tx.send_modify(|p| p.started_at = started);

        while !self.state.state.is_terminal() {
            let current = self.state.state;
            self.state.phase = current.phase();
            self.visited.push(current);

            let outcome = self.act(current).await;
            if let Err(e) = &outcome {
                self.state.record(e);
            }

            let next = current.transition(&outcome);
            if next == ReceiverState::UnknownError && current != ReceiverState::UnknownError {
                if let Some(err) = unexpected_frame(current.expected_frame(), &outcome) {
                    self.state.record(&err);
                }
            }

            tracing::trace!("Receiver {:?} -> {:?}", current, next);
            self.state.state = next;
        }

        let done = self.state.state;
        self.state.phase = done.phase();
        self.visited.push(done);

        let success = done == ReceiverState::Done(Outcome::Success);
        self.progress_tx.send_modify(|p| {
            p.state = if success {
                TransferState::Completed
            } else {
                TransferState::Failed
            };
        });

        let destination = self.record.as_ref().map(|r| r.path.clone());
        TransferReport::from_state(&self.state, success, destination, started.elapsed())
    }

    async fn act(&mut self, state: ReceiverState) -> Result<Signal> {
        match state {
            ReceiverState::RecvSessionParameters => self.recv_session_parameters().await,
            ReceiverState::CheckSessionParameters => self.check_session_parameters(),
            ReceiverState::AckSessionParameters => self.ack_session_parameters().await,
            ReceiverState::RecvClientReady => self.recv_client_ready().await,
            ReceiverState::RecvDataBlocks => self.recv_data_blocks().await,
            ReceiverState::RecvFileFinish => self.recv_file_finish().await,
            ReceiverState::AckFileFinish => self.ack_file_finish().await,
            ReceiverState::UnknownError => {
                if let Some(error) = &self.state.last_error {
                    tracing::error!(
                        "Session {} failed: {}",
                        self.state.session_token,
                        error.message
                    );
                }
                Ok(Signal::Proceed)
            }
            ReceiverState::SendSessionClose => {
                self.close().await;
                Ok(Signal::Proceed)
            }
            ReceiverState::Done(_) => Ok(Signal::Proceed),
        }
    }

    fn accepted(&self) -> Result<&FileRecord> {
        self.record
            .as_ref()
            .ok_or_else(|| Error::ProtocolError("no accepted session parameters".to_string()))
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

    fn closed_by_peer(&mut self, code: ErrorCode) -> Error {
        self.peer_closed = true;
        Error::PeerClosed(format!("sender closed the session: {code}"))
    }

    fn reject(&mut self, rejection: Rejection) -> Signal {
        tracing::warn!("Refusing transfer: {}", rejection.reason);
        let code = rejection.code;
        self.state.record(&Error::AdmissionRejected {
            code,
            reason: rejection.reason,
        });
        Signal::Rejected(code)
    }

    async fn recv_session_parameters(&mut self) -> Result<Signal> {
        match self.channel.recv_frame().await? {
            Frame::SessionInit(sif) => {
                self.state.session_token = sif.session_token;
                let payload = self
                    .channel
                    .recv_payload(usize::from(sif.parameter_length))
                    .await?;
                self.request = Some((sif, payload));
                Ok(Signal::Received(MessageType::SessionInit))
            }
            Frame::SessionClose(scf) => Err(self.closed_by_peer(scf.error_code)),
            other => Ok(Signal::Received(other.message_type())),
        }
    }

    fn check_session_parameters(&mut self) -> Result<Signal> {
        let (sif, payload) = self
            .request
            .take()
            .ok_or_else(|| Error::ProtocolError("no SIF to check".to_string()))?;

        if ParameterFormat::from_u16(sif.parameter_format) != Some(ParameterFormat::Simple) {
            return Ok(self.reject(Rejection::new(
                ErrorCode::UnknownFormat,
                format!("unsupported parameter format {}", sif.parameter_format),
            )));
        }

        let params = match SessionParameters::decode(&payload) {
            Ok(params) => params,
            Err(e @ DecodeError::Truncated { .. }) => {
                return Ok(self.reject(Rejection::new(ErrorCode::MissingParameter, e.to_string())));
            }
            Err(e) => {
                return Ok(self.reject(Rejection::new(
                    ErrorCode::UnacceptableParameters,
                    e.to_string(),
                )));
            }
        };
        self.state.params = Some(params.clone());

        if !params.is_consistent() {
            return Ok(self.reject(Rejection::new(
                ErrorCode::UnacceptableParameters,
                format!(
                    "{} chunks do not cover {} bytes in chunks of {}",
                    params.num_chunks, params.file_size, params.chunk_size
                ),
            )));
        }

        let Some(destination) = file::resolve_destination(&self.transfer_dir, &params.filename)
        else {
            return Ok(self.reject(Rejection::new(
                ErrorCode::UnacceptableParameters,
                format!("unsafe filename '{}'", params.filename),
            )));
        };

        if let Err(rejection) = self.policy.admit(&params) {
            return Ok(self.reject(rejection));
        }

        tracing::info!(
            "Accepted {} ({} bytes, {} chunks) for session {}",
            params.filename,
            params.file_size,
            params.num_chunks,
            self.state.session_token
        );

        self.progress_tx.send_modify(|p| {
            p.filename.clone_from(&params.filename);
            p.total_bytes = params.file_size;
            p.total_chunks = u64::from(params.num_chunks);
        });
        self.record = Some(FileRecord::announced(destination, params));

        Ok(Signal::Proceed)
    }

    async fn ack_session_parameters(&mut self) -> Result<Signal> {
        let echo = self.accepted()?.params.encode();
        let saf = Frame::SessionAck(SessionInitFrame {
            error_code: ErrorCode::NoError,
            session_token: self.state.session_token,
            parameter_format: ParameterFormat::Simple as u16,
            parameter_length: SIMPLE_PARAMETERS_LEN as u16,
        });

        self.channel.send_frame(&saf).await?;
        self.channel.send_payload(&echo).await?;

        match self.channel.recv_frame().await? {
            Frame::SessionReady(srf) => {
                self.check_token(srf.session_token)?;
                Ok(Signal::Received(MessageType::SessionReady))
            }
            Frame::SessionClose(scf) => Err(self.closed_by_peer(scf.error_code)),
            other => Ok(Signal::Received(other.message_type())),
        }
    }

    async fn recv_client_ready(&mut self) -> Result<Signal> {
        let record = self.accepted()?;
        let writer = ChunkWriter::create(record.path.clone(), record.params.file_size).await?;
        tracing::debug!("Writing to {}", writer.output_path.display());
        self.writer = Some(writer);
        Ok(Signal::Proceed)
    }

    async fn recv_data_blocks(&mut self) -> Result<Signal> {
        self.progress_tx
            .send_modify(|p| p.state = TransferState::Transferring);

        let record = self
            .record
            .as_ref()
            .ok_or_else(|| Error::ProtocolError("no accepted session parameters".to_string()))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::ProtocolError("destination not open".to_string()))?;

        let engine = ChunkTransferEngine::new(
            self.state.session_token,
            &record.params,
            crate::MAX_RETRIES,
            &self.progress_tx,
        );
        engine
            .recv_chunks(&mut self.channel, writer, &mut self.state.chunk)
            .await?;

        Ok(Signal::Proceed)
    }

    async fn recv_file_finish(&mut self) -> Result<Signal> {
        let record = self
            .record
            .as_ref()
            .ok_or_else(|| Error::ProtocolError("no accepted session parameters".to_string()))?;

        let engine = ChunkTransferEngine::new(
            self.state.session_token,
            &record.params,
            crate::MAX_RETRIES,
            &self.progress_tx,
        );
        engine.await_finish(&mut self.channel).await?;

        Ok(Signal::Received(MessageType::FileFinish))
    }

    async fn ack_file_finish(&mut self) -> Result<Signal> {
        self.progress_tx
            .send_modify(|p| p.state = TransferState::Verifying);

        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::ProtocolError("destination not open".to_string()))?;
        let written = writer.finalize().await?;

        let record = self
            .record
            .as_mut()
            .ok_or_else(|| Error::ProtocolError("no accepted session parameters".to_string()))?;

        let actual = crypto::digest_file(&record.path).await?;
        if actual != record.params.hash {
            return Err(Error::IntegrityMismatch {
                file: record.params.filename.clone(),
                expected: crypto::to_hex(&record.params.hash),
                actual: crypto::to_hex(&actual),
            });
        }
        record.hash_status = HashStatus::Verified;

        self.channel
            .send_frame(&Frame::file_finish_ack(self.state.session_token))
            .await?;

        tracing::info!(
            "Received {} ({} bytes), sha1 {}",
            record.path.display(),
            written,
            crypto::to_hex(&actual)
        );
        Ok(Signal::Proceed)
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

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ReceiverState; 11] = [
        ReceiverState::RecvSessionParameters,
        ReceiverState::CheckSessionParameters,
        ReceiverState::AckSessionParameters,
        ReceiverState::RecvClientReady,
        ReceiverState::RecvDataBlocks,
        ReceiverState::RecvFileFinish,
        ReceiverState::AckFileFinish,
        ReceiverState::UnknownError,
        ReceiverState::SendSessionClose,
        ReceiverState::Done(Outcome::Success),
        ReceiverState::Done(Outcome::Failure),
    ];

    fn outcomes() -> Vec<Result<Signal>> {
        vec![
            Ok(Signal::Proceed),
            Ok(Signal::Received(MessageType::SessionInit)),
            Ok(Signal::Received(MessageType::SessionReady)),
            Ok(Signal::Received(MessageType::SessionClose)),
            Ok(Signal::Received(MessageType::FileFinish)),
            Ok(Signal::Rejected(ErrorCode::NoDiskSpace)),
            Err(Error::OutOfOrderChunk {
                expected: 0,
                actual: 1,
            }),
        ]
    }

    #[test]
    fn test_happy_path() {
        let script = [
            Ok(Signal::Received(MessageType::SessionInit)),
            Ok(Signal::Proceed),
            Ok(Signal::Received(MessageType::SessionReady)),
            Ok(Signal::Proceed),
            Ok(Signal::Proceed),
            Ok(Signal::Received(MessageType::FileFinish)),
            Ok(Signal::Proceed),
        ];
        let mut state = ReceiverState::RecvSessionParameters;
        for outcome in &script {
            assert!(!state.is_terminal());
            state = state.transition(outcome);
        }
        assert_eq!(state, ReceiverState::Done(Outcome::Success));
    }

    #[test]
    fn test_rejection_never_reaches_client_ready() {
        let mut state = ReceiverState::CheckSessionParameters
            .transition(&Ok(Signal::Rejected(ErrorCode::NoDiskSpace)));
        assert_eq!(state, ReceiverState::SendSessionClose);
        state = state.transition(&Ok(Signal::Proceed));
        assert_eq!(state, ReceiverState::Done(Outcome::Failure));
    }

    #[test]
    fn test_ack_requires_srf() {
        assert_eq!(
            ReceiverState::AckSessionParameters
                .transition(&Ok(Signal::Received(MessageType::SessionClose))),
            ReceiverState::UnknownError
        );
        assert_eq!(
            ReceiverState::AckSessionParameters
                .transition(&Ok(Signal::Received(MessageType::SessionReady))),
            ReceiverState::RecvClientReady
        );
    }

    #[test]
    fn test_file_finish_is_explicit() {
        assert_eq!(
            ReceiverState::RecvFileFinish.transition(&Ok(Signal::Proceed)),
            ReceiverState::UnknownError
        );
        assert_eq!(
            ReceiverState::RecvFileFinish
                .transition(&Ok(Signal::Received(MessageType::FileFinish))),
            ReceiverState::AckFileFinish
        );
    }

    #[test]
    fn test_integrity_failure_does_not_succeed() {
        let outcome = Err(Error::IntegrityMismatch {
            file: "f".into(),
            expected: "a".into(),
            actual: "b".into(),
        });
        let mut state = ReceiverState::AckFileFinish.transition(&outcome);
        while !state.is_terminal() {
            state = state.transition(&Ok(Signal::Proceed));
        }
        assert_eq!(state, ReceiverState::Done(Outcome::Failure));
    }

    #[test]
    fn test_every_state_terminates() {
        for start in ALL_STATES {
            for outcome in outcomes() {
                let mut state = start.transition(&outcome);
                let mut steps = 0;
                while !state.is_terminal() {
                    state = state.transition(&Err(Error::Timeout(1)));
                    steps += 1;
                    assert!(steps <= 3, "{start:?} did not terminate");
                }
            }
        }
    }

    #[test]
    fn test_phases() {
        assert_eq!(ReceiverState::CheckSessionParameters.phase(), Phase::Negotiation);
        assert_eq!(ReceiverState::RecvDataBlocks.phase(), Phase::Transfer);
        assert_eq!(ReceiverState::AckFileFinish.phase(), Phase::Teardown);
    }
}
