//! File handling for CFTP transfers.
//!
//! This module handles:
//! - The [`FileRecord`] describing the one file a session moves
//! - Reading chunks at their offsets on the sender
//! - Appending chunks on the receiver
//! - Mapping an announced filename onto the transfer directory

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::crypto;
use crate::error::{Error, Result};
use crate::protocol::SessionParameters;

/// Where a record's digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStatus {
    /// Computed locally from the source file (sender)
    Authoritative,
    /// Received during negotiation, not yet checked (receiver)
    Announced,
    /// Recomputed from the written file and matched (receiver)
    Verified,
}

/// The file a session transfers.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Local path of the source or destination
    pub path: PathBuf,
    /// Name, size, chunk geometry and digest
    pub params: SessionParameters,
    /// Trust level of `params.hash`
    pub hash_status: HashStatus,
}

impl FileRecord {
    /// Describe a local source file, computing its digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a readable regular file, its name
    /// does not fit the parameter payload, or `chunk_size` is zero.
    pub async fn from_path(path: &Path, chunk_size: u32) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(Error::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;

        let hash = crypto::digest_file(path).await?;

        let params = SessionParameters::new(filename, metadata.len(), chunk_size, hash)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "cannot announce '{filename}' with chunk size {chunk_size}"
                ))
            })?;

        tracing::debug!(
            "Prepared {} ({} bytes, {} chunks, sha1 {})",
            params.filename,
            params.file_size,
            params.num_chunks,
            crypto::to_hex(&params.hash)
        );

        Ok(Self {
            path: path.to_path_buf(),
            params,
            hash_status: HashStatus::Authoritative,
        })
    }

    /// Record for a file announced by a peer, to be written at `path`.
    pub fn announced(path: PathBuf, params: SessionParameters) -> Self {
        Self {
            path,
            params,
            hash_status: HashStatus::Announced,
        }
    }

    /// File name as carried on the wire.
    pub fn filename(&self) -> &str {
        &self.params.filename
    }
}

/// Reads chunks of a source file by index.
#[derive(Debug)]
pub struct ChunkReader {
    file: tokio::fs::File,
    params: SessionParameters,
}

impl ChunkReader {
    /// Open the source file of `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(record: &FileRecord) -> Result<Self> {
        let file = tokio::fs::File::open(&record.path).await?;
        Ok(Self {
            file,
            params: record.params.clone(),
        })
    }

    /// Read chunk `index` from offset `index * chunk_size`.
    ///
    /// Only the last chunk may be shorter than `chunk_size`. A file that
    /// ends early is an I/O error.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or reading fails.
    pub async fn read_chunk(&mut self, index: u64) -> Result<Vec<u8>> {
        let offset = index.saturating_mul(u64::from(self.params.chunk_size));
        let mut buffer = vec![0u8; self.params.chunk_len(index)];

        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(&mut buffer).await?;

        Ok(buffer)
    }
}

/// Appends received chunks to the destination file.
#[derive(Debug)]
pub struct ChunkWriter {
    /// Output file path
    pub output_path: PathBuf,
    /// Expected total file size
    pub expected_size: u64,
    file: tokio::fs::File,
    bytes_written: u64,
}

impl ChunkWriter {
    /// Create (or truncate) the output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub async fn create(output_path: PathBuf, expected_size: u64) -> Result<Self> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = tokio::fs::File::create(&output_path).await?;

        Ok(Self {
            output_path,
            expected_size,
            file,
            bytes_written: 0,
        })
    }

    /// Append `data` at the current end of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and sync, closing the write handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be synced.
    pub async fn finalize(mut self) -> Result<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.bytes_written)
    }

    /// Bytes written so far.
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Map an announced filename to a path inside `base`.
///
/// The name must be exactly one normal path component: no separators,
/// no `.` or `..`, not empty.
pub fn resolve_destination(base: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() || filename.contains(['/', '\\']) {
        return None;
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => {
            let full_path = base.join(name);
            full_path.starts_with(base).then_some(full_path)
        }
        _ => None,
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
