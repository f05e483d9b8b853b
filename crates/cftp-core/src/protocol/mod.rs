//! CFTP wire protocol implementation.
//!
//! Every control message is a fixed 32-byte frame. Byte 0 is always the
//! message type; the remaining fields depend on the frame kind and are
//! stored at explicit offsets, big-endian, zero padded to 32 bytes.
//!
//! ## Frame Layouts
//!
//! ```text
//! SIF/SAF  [0]=type [1..3]=ErrorCode [3]=Token [4..6]=ParameterFormat [6..8]=ParameterLength
//! SRF/SCF  [0]=type [1..3]=ErrorCode [3]=Token
//! DTF      [0]=type [1..3]=ErrorCode [3]=Token [4..12]=DataSize    [12..20]=BlockNum
//! DAF      [0]=type [1..3]=ErrorCode [3]=Token [4..12]=BlockNum
//! FFF/FAF  [0]=type [1..3]=ErrorCode [3]=Token
//! DSF/DRF  [0]=type [1]=AddressType [2..6]=IPv4 [6..22]=IPv6 (4 x u32)
//!          [22..24]=IPv4Port [24..26]=IPv6Port
//! ```
//!
//! Unframed payloads follow some frames on the stream: the SIMPLE session
//! parameters after SIF/SAF (see [`params`]) and the raw chunk bytes after
//! each DTF.

pub mod params;

pub use params::{ParameterFormat, SessionParameters, SIMPLE_PARAMETERS_LEN};

use std::fmt;

use thiserror::Error;

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 32;

/// Largest session parameter payload a peer may announce.
pub const MAX_PARAMETER_LENGTH: u16 = 4096;

/// Largest chunk payload a DTF may announce (64 MB).
pub const MAX_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Errors raised while decoding frames or session parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Byte 0 does not name one of the ten frame kinds
    #[error("unknown message type: {0:#04x}")]
    UnknownType(u8),

    /// A length field exceeds the permitted maximum
    #[error("{field} of {value} exceeds maximum of {max}")]
    OversizedField {
        /// Name of the offending field
        field: &'static str,
        /// Declared value
        value: u64,
        /// Largest accepted value
        max: u64,
    },

    /// The ErrorCode field holds an undefined value
    #[error("unknown error code: {0}")]
    UnknownErrorCode(u16),

    /// A payload is shorter or longer than its layout requires
    #[error("payload has {actual} bytes, expected {expected}")]
    Truncated {
        /// Required length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// The filename field is not NUL terminated UTF-8
    #[error("invalid filename field: {0}")]
    InvalidFilename(String),
}

/// Message types in the CFTP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Discovery search (DSF)
    Discover = 0x00,
    /// Discovery reply (DRF)
    DiscoverReply = 0x01,
    /// Session initiate (SIF)
    SessionInit = 0x10,
    /// Session acknowledge (SAF)
    SessionAck = 0x11,
    /// Session ready (SRF)
    SessionReady = 0x12,
    /// Session close (SCF)
    SessionClose = 0x13,
    /// Data transfer (DTF)
    DataTransfer = 0x20,
    /// Data acknowledgment (DAF)
    DataAck = 0x21,
    /// File finish (FFF)
    FileFinish = 0x30,
    /// File finish acknowledgment (FAF)
    FileFinishAck = 0x31,
}

impl MessageType {
    /// Parse a message type from a byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Discover),
            0x01 => Some(Self::DiscoverReply),
            0x10 => Some(Self::SessionInit),
            0x11 => Some(Self::SessionAck),
            0x12 => Some(Self::SessionReady),
            0x13 => Some(Self::SessionClose),
            0x20 => Some(Self::DataTransfer),
            0x21 => Some(Self::DataAck),
            0x30 => Some(Self::FileFinish),
            0x31 => Some(Self::FileFinishAck),
            _ => None,
        }
    }

    /// Three-letter protocol name of the frame kind.
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Discover => "DSF",
            Self::DiscoverReply => "DRF",
            Self::SessionInit => "SIF",
            Self::SessionAck => "SAF",
            Self::SessionReady => "SRF",
            Self::SessionClose => "SCF",
            Self::DataTransfer => "DTF",
            Self::DataAck => "DAF",
            Self::FileFinish => "FFF",
            Self::FileFinishAck => "FAF",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Error codes carried in every control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum ErrorCode {
    /// No error
    #[default]
    NoError = 0,
    /// The client stopped responding
    ClientTimeout = 1,
    /// The server stopped responding
    ServerTimeout = 2,
    /// Unsupported parameter format
    UnknownFormat = 3,
    /// The server is busy
    Overloaded = 4,
    /// Generic timeout
    Timeout = 5,
    /// Session token already in use
    DuplicateSessionToken = 6,
    /// Required parameter missing
    MissingParameter = 7,
    /// No session with this token
    NoSession = 8,
    /// Parameters were understood but refused
    UnacceptableParameters = 9,
    /// Not enough space or quota for the file
    NoDiskSpace = 10,
}

impl ErrorCode {
    /// Parse an error code from its wire value.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::ClientTimeout),
            2 => Some(Self::ServerTimeout),
            3 => Some(Self::UnknownFormat),
            4 => Some(Self::Overloaded),
            5 => Some(Self::Timeout),
            6 => Some(Self::DuplicateSessionToken),
            7 => Some(Self::MissingParameter),
            8 => Some(Self::NoSession),
            9 => Some(Self::UnacceptableParameters),
            10 => Some(Self::NoDiskSpace),
            _ => None,
        }
    }

    /// Human-readable reason.
    pub const fn description(self) -> &'static str {
        match self {
            Self::NoError => "no error",
            Self::ClientTimeout => "client timed out",
            Self::ServerTimeout => "server timed out",
            Self::UnknownFormat => "unknown parameter format",
            Self::Overloaded => "server overloaded",
            Self::Timeout => "timed out",
            Self::DuplicateSessionToken => "duplicate session token",
            Self::MissingParameter => "missing parameter",
            Self::NoSession => "no such session",
            Self::UnacceptableParameters => "unacceptable parameters",
            Self::NoDiskSpace => "no disk space",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Body shared by SIF and SAF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInitFrame {
    /// Error code
    pub error_code: ErrorCode,
    /// Session token
    pub session_token: u8,
    /// Raw parameter format (see [`ParameterFormat`])
    pub parameter_format: u16,
    /// Length of the unframed parameter payload that follows
    pub parameter_length: u16,
}

/// Body shared by SRF, SCF, FFF and FAF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Error code
    pub error_code: ErrorCode,
    /// Session token
    pub session_token: u8,
}

/// DTF body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTransferFrame {
    /// Error code
    pub error_code: ErrorCode,
    /// Session token
    pub session_token: u8,
    /// Announced chunk size
    pub data_size: u64,
    /// Zero-based chunk index
    pub block_num: u64,
}

/// DAF body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAckFrame {
    /// Error code
    pub error_code: ErrorCode,
    /// Session token
    pub session_token: u8,
    /// Chunk index being acknowledged
    pub block_num: u64,
}

/// Body shared by DSF and DRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveryFrame {
    /// Address family selector
    pub address_type: u8,
    /// IPv4 address as a big-endian word
    pub ipv4_address: u32,
    /// IPv6 address as four big-endian words
    pub ipv6_address: [u32; 4],
    /// IPv4 port
    pub ipv4_port: u16,
    /// IPv6 port
    pub ipv6_port: u16,
}

/// A decoded CFTP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// DSF
    Discover(DiscoveryFrame),
    /// DRF
    DiscoverReply(DiscoveryFrame),
    /// SIF
    SessionInit(SessionInitFrame),
    /// SAF
    SessionAck(SessionInitFrame),
    /// SRF
    SessionReady(ControlFrame),
    /// SCF
    SessionClose(ControlFrame),
    /// DTF
    DataTransfer(DataTransferFrame),
    /// DAF
    DataAck(DataAckFrame),
    /// FFF
    FileFinish(ControlFrame),
    /// FAF
    FileFinishAck(ControlFrame),
}

impl Frame {
    /// Message type of this frame.
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Discover(_) => MessageType::Discover,
            Self::DiscoverReply(_) => MessageType::DiscoverReply,
            Self::SessionInit(_) => MessageType::SessionInit,
            Self::SessionAck(_) => MessageType::SessionAck,
            Self::SessionReady(_) => MessageType::SessionReady,
            Self::SessionClose(_) => MessageType::SessionClose,
            Self::DataTransfer(_) => MessageType::DataTransfer,
            Self::DataAck(_) => MessageType::DataAck,
            Self::FileFinish(_) => MessageType::FileFinish,
            Self::FileFinishAck(_) => MessageType::FileFinishAck,
        }
    }

    /// Session token, for every kind except discovery frames.
    pub const fn session_token(&self) -> Option<u8> {
        match self {
            Self::Discover(_) | Self::DiscoverReply(_) => None,
            Self::SessionInit(f) | Self::SessionAck(f) => Some(f.session_token),
            Self::SessionReady(f)
            | Self::SessionClose(f)
            | Self::FileFinish(f)
            | Self::FileFinishAck(f) => Some(f.session_token),
            Self::DataTransfer(f) => Some(f.session_token),
            Self::DataAck(f) => Some(f.session_token),
        }
    }

    /// Error code, for every kind except discovery frames.
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Discover(_) | Self::DiscoverReply(_) => None,
            Self::SessionInit(f) | Self::SessionAck(f) => Some(f.error_code),
            Self::SessionReady(f)
            | Self::SessionClose(f)
            | Self::FileFinish(f)
            | Self::FileFinishAck(f) => Some(f.error_code),
            Self::DataTransfer(f) => Some(f.error_code),
            Self::DataAck(f) => Some(f.error_code),
        }
    }

    /// SRF for `token`.
    pub const fn session_ready(session_token: u8) -> Self {
        Self::SessionReady(ControlFrame {
            error_code: ErrorCode::NoError,
            session_token,
        })
    }

    /// SCF for `token` carrying `error_code`.
    pub const fn session_close(session_token: u8, error_code: ErrorCode) -> Self {
        Self::SessionClose(ControlFrame {
            error_code,
            session_token,
        })
    }

    /// DTF announcing chunk `block_num`.
    pub const fn data_transfer(session_token: u8, data_size: u64, block_num: u64) -> Self {
        Self::DataTransfer(DataTransferFrame {
            error_code: ErrorCode::NoError,
            session_token,
            data_size,
            block_num,
        })
    }

    /// DAF acknowledging chunk `block_num`.
    pub const fn data_ack(session_token: u8, block_num: u64) -> Self {
        Self::DataAck(DataAckFrame {
            error_code: ErrorCode::NoError,
            session_token,
            block_num,
        })
    }

    /// FFF for `token`.
    pub const fn file_finish(session_token: u8) -> Self {
        Self::FileFinish(ControlFrame {
            error_code: ErrorCode::NoError,
            session_token,
        })
    }

    /// FAF for `token`.
    pub const fn file_finish_ack(session_token: u8) -> Self {
        Self::FileFinishAck(ControlFrame {
            error_code: ErrorCode::NoError,
            session_token,
        })
    }

    /// Encode this frame into its 32-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        encode(self)
    }

    /// Decode a frame from its 32-byte wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the message type or a field is invalid.
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Self, DecodeError> {
        decode(buf)
    }
}

fn put_u16(buf: &mut [u8; FRAME_SIZE], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut [u8; FRAME_SIZE], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn put_u64(buf: &mut [u8; FRAME_SIZE], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_be_bytes());
}

fn get_u16(buf: &[u8; FRAME_SIZE], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn get_u32(buf: &[u8; FRAME_SIZE], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn get_u64(buf: &[u8; FRAME_SIZE], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(bytes)
}

fn put_header(buf: &mut [u8; FRAME_SIZE], error_code: ErrorCode, session_token: u8) {
    put_u16(buf, 1, error_code as u16);
    buf[3] = session_token;
}

fn get_error_code(buf: &[u8; FRAME_SIZE]) -> Result<ErrorCode, DecodeError> {
    let raw = get_u16(buf, 1);
    ErrorCode::from_u16(raw).ok_or(DecodeError::UnknownErrorCode(raw))
}

/// Encode a frame into its 32-byte wire form.
#[must_use]
pub fn encode(frame: &Frame) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    buf[0] = frame.message_type() as u8;

    match frame {
        Frame::Discover(d) | Frame::DiscoverReply(d) => {
            buf[1] = d.address_type;
            put_u32(&mut buf, 2, d.ipv4_address);
            for (i, word) in d.ipv6_address.iter().enumerate() {
                put_u32(&mut buf, 6 + i * 4, *word);
            }
            put_u16(&mut buf, 22, d.ipv4_port);
            put_u16(&mut buf, 24, d.ipv6_port);
        }
        Frame::SessionInit(s) | Frame::SessionAck(s) => {
            put_header(&mut buf, s.error_code, s.session_token);
            put_u16(&mut buf, 4, s.parameter_format);
            put_u16(&mut buf, 6, s.parameter_length);
        }
        Frame::SessionReady(c)
        | Frame::SessionClose(c)
        | Frame::FileFinish(c)
        | Frame::FileFinishAck(c) => {
            put_header(&mut buf, c.error_code, c.session_token);
        }
        Frame::DataTransfer(d) => {
            put_header(&mut buf, d.error_code, d.session_token);
            put_u64(&mut buf, 4, d.data_size);
            put_u64(&mut buf, 12, d.block_num);
        }
        Frame::DataAck(a) => {
            put_header(&mut buf, a.error_code, a.session_token);
            put_u64(&mut buf, 4, a.block_num);
        }
    }

    buf
}

/// Decode a frame from its 32-byte wire form.
///
/// # Errors
///
/// Returns [`DecodeError::UnknownType`] for an unrecognized message type,
/// [`DecodeError::OversizedField`] when `ParameterLength` or `DataSize`
/// exceeds its maximum, and [`DecodeError::UnknownErrorCode`] for an
/// undefined error code.
pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Frame, DecodeError> {
    let message_type = MessageType::from_byte(buf[0]).ok_or(DecodeError::UnknownType(buf[0]))?;

    let frame = match message_type {
        MessageType::Discover | MessageType::DiscoverReply => {
            let mut ipv6_address = [0u32; 4];
            for (i, word) in ipv6_address.iter_mut().enumerate() {
                *word = get_u32(buf, 6 + i * 4);
            }
            let body = DiscoveryFrame {
                address_type: buf[1],
                ipv4_address: get_u32(buf, 2),
                ipv6_address,
                ipv4_port: get_u16(buf, 22),
                ipv6_port: get_u16(buf, 24),
            };
            if message_type == MessageType::Discover {
                Frame::Discover(body)
            } else {
                Frame::DiscoverReply(body)
            }
        }
        MessageType::SessionInit | MessageType::SessionAck => {
            let parameter_length = get_u16(buf, 6);
            if parameter_length > MAX_PARAMETER_LENGTH {
                return Err(DecodeError::OversizedField {
                    field: "ParameterLength",
                    value: u64::from(parameter_length),
                    max: u64::from(MAX_PARAMETER_LENGTH),
                });
            }
            let body = SessionInitFrame {
                error_code: get_error_code(buf)?,
                session_token: buf[3],
                parameter_format: get_u16(buf, 4),
                parameter_length,
            };
            if message_type == MessageType::SessionInit {
                Frame::SessionInit(body)
            } else {
                Frame::SessionAck(body)
            }
        }
        MessageType::SessionReady
        | MessageType::SessionClose
        | MessageType::FileFinish
        | MessageType::FileFinishAck => {
            let body = ControlFrame {
                error_code: get_error_code(buf)?,
                session_token: buf[3],
            };
            match message_type {
                MessageType::SessionReady => Frame::SessionReady(body),
                MessageType::SessionClose => Frame::SessionClose(body),
                MessageType::FileFinish => Frame::FileFinish(body),
                _ => Frame::FileFinishAck(body),
            }
        }
        MessageType::DataTransfer => {
            let data_size = get_u64(buf, 4);
            if data_size > MAX_DATA_SIZE {
                return Err(DecodeError::OversizedField {
                    field: "DataSize",
                    value: data_size,
                    max: MAX_DATA_SIZE,
                });
            }
            Frame::DataTransfer(DataTransferFrame {
                error_code: get_error_code(buf)?,
                session_token: buf[3],
                data_size,
                block_num: get_u64(buf, 12),
            })
        }
        MessageType::DataAck => Frame::DataAck(DataAckFrame {
            error_code: get_error_code(buf)?,
            session_token: buf[3],
            block_num: get_u64(buf, 4),
        }),
    };

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_TYPES: [u8; 10] = [0x00, 0x01, 0x10, 0x11, 0x12, 0x13, 0x20, 0x21, 0x30, 0x31];

    fn sample_frames() -> Vec<Frame> {
        let init = SessionInitFrame {
            error_code: ErrorCode::NoError,
            session_token: 0xA5,
            parameter_format: ParameterFormat::Simple as u16,
            parameter_length: SIMPLE_PARAMETERS_LEN as u16,
        };
        let discovery = DiscoveryFrame {
            address_type: 4,
            ipv4_address: 0xC0A8_0164,
            ipv6_address: [0x2001_0DB8, 0, 0, 1],
            ipv4_port: 9400,
            ipv6_port: 9401,
        };
        vec![
            Frame::Discover(discovery),
            Frame::DiscoverReply(DiscoveryFrame::default()),
            Frame::SessionInit(init),
            Frame::SessionAck(SessionInitFrame {
                error_code: ErrorCode::NoDiskSpace,
                ..init
            }),
            Frame::session_ready(7),
            Frame::session_close(7, ErrorCode::UnacceptableParameters),
            Frame::data_transfer(7, MAX_DATA_SIZE, u64::MAX),
            Frame::data_ack(7, 0x0102_0304_0506_0708),
            Frame::file_finish(255),
            Frame::file_finish_ack(0),
        ]
    }

    #[test]
    fn test_every_kind_roundtrips() {
        for frame in sample_frames() {
            let encoded = frame.encode();
            assert_eq!(encoded[0], frame.message_type() as u8);
            let decoded = Frame::decode(&encoded).expect("decode");
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_message_type_from_byte() {
        for byte in KNOWN_TYPES {
            let mt = MessageType::from_byte(byte).expect("known type");
            assert_eq!(mt as u8, byte);
        }
        assert_eq!(MessageType::from_byte(0x02), None);
        assert_eq!(MessageType::from_byte(0xFF), None);
    }

    #[test]
    fn test_decode_rejects_every_unknown_type() {
        for byte in 0..=u8::MAX {
            if KNOWN_TYPES.contains(&byte) {
                continue;
            }
            let mut buf = [0u8; FRAME_SIZE];
            buf[0] = byte;
            assert_eq!(decode(&buf), Err(DecodeError::UnknownType(byte)));
        }
    }

    #[test]
    fn test_dtf_byte_layout() {
        let encoded = Frame::data_transfer(0x42, 0x1000, 3).encode();

        assert_eq!(encoded[0], 0x20);
        assert_eq!(&encoded[1..3], &[0, 0]);
        assert_eq!(encoded[3], 0x42);
        assert_eq!(&encoded[4..12], &[0, 0, 0, 0, 0, 0, 0x10, 0]);
        assert_eq!(&encoded[12..20], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert!(encoded[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_sif_byte_layout() {
        let frame = Frame::SessionInit(SessionInitFrame {
            error_code: ErrorCode::MissingParameter,
            session_token: 9,
            parameter_format: 1,
            parameter_length: 0x0224,
        });
        let encoded = frame.encode();

        assert_eq!(&encoded[..8], &[0x10, 0, 7, 9, 0, 1, 0x02, 0x24]);
        assert!(encoded[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_rejects_oversized_parameter_length() {
        let mut buf = Frame::SessionInit(SessionInitFrame {
            error_code: ErrorCode::NoError,
            session_token: 1,
            parameter_format: 1,
            parameter_length: 0,
        })
        .encode();
        buf[6..8].copy_from_slice(&(MAX_PARAMETER_LENGTH + 1).to_be_bytes());

        match decode(&buf) {
            Err(DecodeError::OversizedField { field, .. }) => assert_eq!(field, "ParameterLength"),
            other => panic!("expected OversizedField, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_data_size() {
        let mut buf = Frame::data_transfer(1, 0, 0).encode();
        buf[4..12].copy_from_slice(&(MAX_DATA_SIZE + 1).to_be_bytes());

        match decode(&buf) {
            Err(DecodeError::OversizedField { field, value, .. }) => {
                assert_eq!(field, "DataSize");
                assert_eq!(value, MAX_DATA_SIZE + 1);
            }
            other => panic!("expected OversizedField, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_error_code() {
        let mut buf = Frame::file_finish(1).encode();
        buf[1..3].copy_from_slice(&11u16.to_be_bytes());
        assert_eq!(decode(&buf), Err(DecodeError::UnknownErrorCode(11)));
    }

    #[test]
    fn test_error_code_values() {
        for value in 0..=10u16 {
            let code = ErrorCode::from_u16(value).expect("defined code");
            assert_eq!(code as u16, value);
        }
        assert_eq!(ErrorCode::from_u16(11), None);
        assert_eq!(ErrorCode::NoDiskSpace as u16, 10);
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::session_close(3, ErrorCode::NoSession);
        assert_eq!(frame.message_type(), MessageType::SessionClose);
        assert_eq!(frame.session_token(), Some(3));
        assert_eq!(frame.error_code(), Some(ErrorCode::NoSession));

        let discover = Frame::Discover(DiscoveryFrame::default());
        assert_eq!(discover.session_token(), None);
        assert_eq!(discover.error_code(), None);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::DataAck.to_string(), "DAF");
        assert_eq!(MessageType::SessionInit.to_string(), "SIF");
    }
}
