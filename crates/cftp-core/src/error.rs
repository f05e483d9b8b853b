//! Error types for CFTP.
//!
//! This module provides a unified error type for all CFTP operations,
//! a coarse [`ErrorKind`] used in transfer reports, and the mapping from
//! local failures onto the [`ErrorCode`] placed in a closing SCF frame.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::protocol::{DecodeError, ErrorCode, MessageType};
use crate::session::Role;

/// A specialized `Result` type for CFTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for CFTP.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or oversized frame
    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),

    /// A frame arrived that the current state does not accept
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message type
        expected: MessageType,
        /// Actual message type received
        actual: MessageType,
    },

    /// A frame carried a session token other than the negotiated one
    #[error("session token mismatch: expected {expected}, got {actual}")]
    TokenMismatch {
        /// Negotiated token
        expected: u8,
        /// Token found in the frame
        actual: u8,
    },

    /// Invalid protocol exchange
    #[error("protocol violation: {0}")]
    ProtocolError(String),

    /// The sender gave up on a chunk
    #[error("no valid acknowledgment for chunk {chunk} after {attempts} attempts")]
    RetryExhausted {
        /// Chunk index
        chunk: u64,
        /// Number of DTFs sent for the chunk
        attempts: u32,
    },

    /// The receiver got a chunk it was not expecting
    #[error("out of order chunk: expected {expected}, got {actual}")]
    OutOfOrderChunk {
        /// Next chunk index the receiver wanted
        expected: u64,
        /// Chunk index announced by the DTF
        actual: u64,
    },

    /// Post-transfer digest differs from the announced one
    #[error("integrity check failed for '{file}': expected {expected}, computed {actual}")]
    IntegrityMismatch {
        /// File that failed verification
        file: String,
        /// Announced digest (hex)
        expected: String,
        /// Computed digest (hex)
        actual: String,
    },

    /// The receiver refused the announced session parameters
    #[error("transfer rejected ({code}): {reason}")]
    AdmissionRejected {
        /// Code carried by the closing SCF
        code: ErrorCode,
        /// Reason for the rejection
        reason: String,
    },

    /// The peer closed the session with an SCF
    #[error("peer closed the session: {0}")]
    PeerClosed(String),

    /// The connection ended or was reset mid-session
    #[error("connection lost: {0}")]
    ConnectionClosed(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Invalid user input outside a session
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Coarse failure classes reported at the session boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong frame type or token for the current state
    ProtocolViolation,
    /// Malformed or oversized frame
    DecodeError,
    /// Local read or write failure
    IoError,
    /// Sender hit the retry limit for a chunk
    RetryExhausted,
    /// Receiver got an unexpected BlockNum
    OutOfOrderChunk,
    /// Post-transfer hash check failed
    IntegrityMismatch,
    /// Quota or parameter constraint failed during negotiation
    AdmissionRejected,
    /// Peer did not respond in time
    Timeout,
    /// Bad configuration or arguments, before any session started
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProtocolViolation => "protocol violation",
            Self::DecodeError => "decode error",
            Self::IoError => "I/O error",
            Self::RetryExhausted => "retries exhausted",
            Self::OutOfOrderChunk => "out of order chunk",
            Self::IntegrityMismatch => "integrity mismatch",
            Self::AdmissionRejected => "admission rejected",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::UnexpectedMessage { .. }
            | Self::TokenMismatch { .. }
            | Self::ProtocolError(_)
            | Self::PeerClosed(_) => ErrorKind::ProtocolViolation,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::OutOfOrderChunk { .. } => ErrorKind::OutOfOrderChunk,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::AdmissionRejected { .. } => ErrorKind::AdmissionRejected,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Io(_) | Self::ConnectionClosed(_) => ErrorKind::IoError,
            Self::FileNotFound(_)
            | Self::InvalidPath(_)
            | Self::InvalidInput(_)
            | Self::ConfigError(_)
            | Self::InvalidConfig { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Error code a session in `role` sends in its closing SCF.
    ///
    /// `None` means the connection is closed without an SCF: either the
    /// peer already closed the session, or no code describes the failure.
    pub const fn wire_code(&self, role: Role) -> Option<ErrorCode> {
        match self {
            Self::AdmissionRejected { code, .. } => Some(*code),
            Self::Timeout(_) => match role {
                Role::Sender => Some(ErrorCode::ClientTimeout),
                Role::Receiver => Some(ErrorCode::ServerTimeout),
            },
            Self::RetryExhausted { .. } => Some(ErrorCode::Timeout),
            Self::Decode(_) => Some(ErrorCode::UnknownFormat),
            Self::TokenMismatch { .. } => Some(ErrorCode::NoSession),
            _ => None,
        }
    }

    /// Whether the failure happened because the peer went away, by SCF or
    /// by dropping the connection.
    pub const fn is_connection_closed(&self) -> bool {
        matches!(self, Self::PeerClosed(_) | Self::ConnectionClosed(_))
    }
}
