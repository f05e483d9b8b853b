//! SIMPLE session parameter payload.
//!
//! Sent unframed right after SIF (announce) and SAF (echo of the accepted
//! values). Fixed layout, big-endian:
//!
//! ```text
//! [0..512]    filename, UTF-8, NUL padded (at most 511 bytes)
//! [512..520]  file_size  u64
//! [520..524]  chunk_size u32
//! [524..528]  num_chunks u32
//! [528..548]  hash       5 x u32
//! ```

use super::DecodeError;
use crate::crypto::Digest;

/// Size of the filename field, including the terminating NUL.
pub const FILENAME_FIELD_LEN: usize = 512;

/// Longest filename that fits in the field.
pub const MAX_FILENAME_LEN: usize = FILENAME_FIELD_LEN - 1;

/// Total size of a SIMPLE payload.
pub const SIMPLE_PARAMETERS_LEN: usize = FILENAME_FIELD_LEN + 8 + 4 + 4 + 20;

/// Encoding of the parameter payload announced by SIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ParameterFormat {
    /// ClassAd text (not supported)
    ClassAd = 0,
    /// Fixed binary layout described in this module
    Simple = 1,
}

impl ParameterFormat {
    /// Parse a format from its wire value.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::ClassAd),
            1 => Some(Self::Simple),
            _ => None,
        }
    }
}

/// Number of chunks needed for `file_size` bytes, or `None` when
/// `chunk_size` is zero or the count does not fit in a `u32`.
pub fn chunk_count(file_size: u64, chunk_size: u32) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(file_size.div_ceil(u64::from(chunk_size))).ok()
}

/// Parameters negotiated for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameters {
    /// File name as announced by the sender
    pub filename: String,
    /// Total file size in bytes
    pub file_size: u64,
    /// Chunk size in bytes
    pub chunk_size: u32,
    /// `ceil(file_size / chunk_size)`
    pub num_chunks: u32,
    /// SHA-1 of the whole file
    pub hash: Digest,
}

impl SessionParameters {
    /// Build parameters, deriving `num_chunks`.
    ///
    /// Returns `None` if the filename does not fit the payload or the chunk
    /// geometry is invalid.
    pub fn new(
        filename: impl Into<String>,
        file_size: u64,
        chunk_size: u32,
        hash: Digest,
    ) -> Option<Self> {
        let filename = filename.into();
        if filename.len() > MAX_FILENAME_LEN || filename.contains('\0') {
            return None;
        }
        let num_chunks = chunk_count(file_size, chunk_size)?;
        Some(Self {
            filename,
            file_size,
            chunk_size,
            num_chunks,
            hash,
        })
    }

    /// Whether `num_chunks` agrees with the file and chunk size.
    pub fn is_consistent(&self) -> bool {
        chunk_count(self.file_size, self.chunk_size) == Some(self.num_chunks)
    }

    /// Bytes of chunk `index` that belong to the file.
    pub fn chunk_len(&self, index: u64) -> usize {
        let start = index.saturating_mul(u64::from(self.chunk_size));
        let remaining = self.file_size.saturating_sub(start);
        // bounded by chunk_size, which is a u32
        remaining.min(u64::from(self.chunk_size)) as usize
    }

    /// Encode into the SIMPLE layout.
    ///
    /// A filename longer than [`MAX_FILENAME_LEN`] is cut at the last
    /// character boundary that fits.
    pub fn encode(&self) -> [u8; SIMPLE_PARAMETERS_LEN] {
        let mut buf = [0u8; SIMPLE_PARAMETERS_LEN];

        let mut end = self.filename.len().min(MAX_FILENAME_LEN);
        while !self.filename.is_char_boundary(end) {
            end -= 1;
        }
        buf[..end].copy_from_slice(&self.filename.as_bytes()[..end]);

        let mut at = FILENAME_FIELD_LEN;
        buf[at..at + 8].copy_from_slice(&self.file_size.to_be_bytes());
        at += 8;
        buf[at..at + 4].copy_from_slice(&self.chunk_size.to_be_bytes());
        at += 4;
        buf[at..at + 4].copy_from_slice(&self.num_chunks.to_be_bytes());
        at += 4;
        for word in self.hash {
            buf[at..at + 4].copy_from_slice(&word.to_be_bytes());
            at += 4;
        }

        buf
    }

    /// Decode a SIMPLE payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when `buf` is not exactly
    /// [`SIMPLE_PARAMETERS_LEN`] bytes and [`DecodeError::InvalidFilename`]
    /// when the filename field is unterminated or not UTF-8.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != SIMPLE_PARAMETERS_LEN {
            return Err(DecodeError::Truncated {
                expected: SIMPLE_PARAMETERS_LEN,
                actual: buf.len(),
            });
        }

        let field = &buf[..FILENAME_FIELD_LEN];
        let nul = field
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| DecodeError::InvalidFilename("missing terminator".to_string()))?;
        let filename = std::str::from_utf8(&field[..nul])
            .map_err(|e| DecodeError::InvalidFilename(e.to_string()))?
            .to_string();

        let word = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&buf[FILENAME_FIELD_LEN..FILENAME_FIELD_LEN + 8]);
        let file_size = u64::from_be_bytes(size_bytes);
        let chunk_size = word(FILENAME_FIELD_LEN + 8);
        let num_chunks = word(FILENAME_FIELD_LEN + 12);

        let mut hash = [0u32; 5];
        for (i, w) in hash.iter_mut().enumerate() {
            *w = word(FILENAME_FIELD_LEN + 16 + i * 4);
        }

        Ok(Self {
            filename,
            file_size,
            chunk_size,
            num_chunks,
            hash,
        })
    }
}
