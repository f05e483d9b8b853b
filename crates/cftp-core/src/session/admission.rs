//! Receiver-side admission checks on announced session parameters.

use crate::protocol::{ErrorCode, SessionParameters};

/// Why a transfer was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Code sent back in the closing SCF
    pub code: ErrorCode,
    /// Human-readable reason
    pub reason: String,
}

impl Rejection {
    /// Create a rejection.
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Local policy applied before a receiver accepts a transfer.
pub trait AdmissionPolicy: Send + Sync {
    /// Accept or refuse `params`.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the transfer must not proceed.
    fn admit(&self, params: &SessionParameters) -> Result<(), Rejection>;
}

/// Size quota and chunk size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Largest accepted file, `None` for unlimited
    pub quota: Option<u64>,
    /// Largest accepted chunk size
    pub max_chunk_size: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            quota: None,
            max_chunk_size: crate::DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl AdmissionPolicy for QuotaPolicy {
    fn admit(&self, params: &SessionParameters) -> Result<(), Rejection> {
        if params.chunk_size == 0 || params.chunk_size > self.max_chunk_size {
            return Err(Rejection::new(
                ErrorCode::UnacceptableParameters,
                format!(
                    "chunk size {} outside 1..={}",
                    params.chunk_size, self.max_chunk_size
                ),
            ));
        }

        if let Some(quota) = self.quota {
            if params.file_size > quota {
                return Err(Rejection::new(
                    ErrorCode::NoDiskSpace,
                    format!("file of {} bytes exceeds quota of {quota} bytes", params.file_size),
                ));
            }
        }

        Ok(())
    }
}
