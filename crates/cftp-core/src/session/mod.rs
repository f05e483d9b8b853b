//! Session state machines.
//!
//! A session drives one file through the CFTP lifecycle:
//!
//! ```text
//! DISCOVERY -> NEGOTIATION -> TRANSFER -> TEARDOWN
//! ```
//!
//! Each role has a closed state enum and a pure transition function. The
//! session loop runs the current state's action, records any error, and
//! asks the transition function for the next state until it reaches
//! `Done`. Every failure funnels through `UnknownError` (logged) and
//! `SendSessionClose` (best-effort SCF) before `Done(Failure)`.

mod admission;
mod receiver;
mod sender;

pub use admission::{AdmissionPolicy, QuotaPolicy, Rejection};
pub use receiver::{ReceiverSession, ReceiverState};
pub use sender::{SenderSession, SenderState};

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{ErrorCode, MessageType, SessionParameters};
use crate::transfer::ChunkProgress;

/// Which end of the connection a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Client, owns the source file
    Sender,
    /// Server, writes the destination file
    Receiver,
}

/// Protocol lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the first frame
    Discovery,
    /// Exchanging and checking session parameters
    Negotiation,
    /// Moving chunks
    Transfer,
    /// Finish handshake, verification or close
    Teardown,
}

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// File delivered and verified
    Success,
    /// Session aborted
    Failure,
}

/// Result of a state action, fed to the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The action completed
    Proceed,
    /// The action received a frame of this kind
    Received(MessageType),
    /// The announced parameters were refused with this code
    Rejected(ErrorCode),
}

/// Description of the error that ended a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Failure class
    pub kind: ErrorKind,
    /// Human-readable reason
    pub message: String,
    /// Code to place in the closing SCF, if any
    #[serde(skip)]
    pub close_code: Option<ErrorCode>,
}

impl ErrorInfo {
    /// Capture `error` as seen by a session playing `role`.
    pub fn from_error(error: &Error, role: Role) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            close_code: error.wire_code(role),
        }
    }
}

/// Per-transfer state owned by the session loop.
#[derive(Debug, Clone)]
pub struct SessionState<St> {
    /// Role of this end
    pub role: Role,
    /// Lifecycle phase of `state`
    pub phase: Phase,
    /// Current state machine state
    pub state: St,
    /// Token negotiated in SIF
    pub session_token: u8,
    /// Negotiated parameters, once known
    pub params: Option<SessionParameters>,
    /// Chunk cursor and retry counters
    pub chunk: ChunkProgress,
    /// Error that sent the session down the failure path
    pub last_error: Option<ErrorInfo>,
}

impl<St> SessionState<St> {
    fn new(role: Role, state: St, session_token: u8) -> Self {
        Self {
            role,
            phase: Phase::Discovery,
            state,
            session_token,
            params: None,
            chunk: ChunkProgress::default(),
            last_error: None,
        }
    }

    fn record(&mut self, error: &Error) {
        // keep the first error; later ones are consequences of it
        if self.last_error.is_none() {
            self.last_error = Some(ErrorInfo::from_error(error, self.role));
        }
    }
}

/// Error recorded when a state receives a frame it does not accept.
fn unexpected_frame(expected: Option<MessageType>, outcome: &Result<Signal>) -> Option<Error> {
    match (expected, outcome) {
        (Some(expected), Ok(Signal::Received(actual))) if expected != *actual => {
            Some(Error::UnexpectedMessage {
                expected,
                actual: *actual,
            })
        }
        (_, Ok(signal)) => Some(Error::ProtocolError(format!(
            "signal {signal:?} not valid in this state"
        ))),
        (_, Err(_)) => None,
    }
}

/// Summary returned by a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    /// Role of the reporting end
    pub role: Role,
    /// Whether the file was delivered and verified
    pub success: bool,
    /// Why the session failed
    pub error: Option<ErrorInfo>,
    /// File name
    pub filename: String,
    /// Where the file was written (receiver only)
    pub destination: Option<PathBuf>,
    /// File size in bytes
    pub file_size: u64,
    /// Number of chunks
    pub num_chunks: u32,
    /// Chunk size in bytes
    pub chunk_size: u32,
    /// Failed chunk attempts
    pub retries: u32,
    /// Resynchronizations
    pub resyncs: u32,
    /// Wall time of the session
    pub elapsed: Duration,
}

impl TransferReport {
    fn from_state<St>(
        state: &SessionState<St>,
        success: bool,
        destination: Option<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        let (filename, file_size, num_chunks, chunk_size) = state.params.as_ref().map_or_else(
            || (String::new(), 0, 0, 0),
            |p| (p.filename.clone(), p.file_size, p.num_chunks, p.chunk_size),
        );

        Self {
            role: state.role,
            success,
            error: state.last_error.clone(),
            filename,
            destination,
            file_size,
            num_chunks,
            chunk_size,
            retries: state.chunk.total_retries(),
            resyncs: state.chunk.resyncs(),
            elapsed,
        }
    }

    /// One-line reason for a failed session.
    pub fn failure_reason(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
