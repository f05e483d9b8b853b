//! Whole-file integrity digests.
//!
//! CFTP announces a SHA-1 digest of the file during negotiation and checks
//! it again after the last chunk. The digest travels on the wire as five
//! big-endian 32-bit words, so that is the shape exposed here.

use std::fmt::Write as _;
use std::path::Path;

use sha1::{Digest as _, Sha1};
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// 160-bit digest as five words.
pub type Digest = [u32; 5];

const READ_BUFFER_SIZE: usize = 64 * 1024;

fn to_words(bytes: &[u8]) -> Digest {
    let mut words = [0u32; 5];
    for (word, quad) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]);
    }
    words
}

/// Digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut hasher = Sha1::new();
    hasher.update(data);
    to_words(&hasher.finalize())
}

/// Digest of a whole file, reading it once from start to end.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn digest_file(path: &Path) -> Result<Digest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(to_words(&hasher.finalize()))
}

/// Recompute the digest of `path` and compare it with `expected`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn verify(expected: &Digest, path: &Path) -> Result<bool> {
    Ok(digest_file(path).await? == *expected)
}

/// Lowercase hex rendering, 40 characters.
pub fn to_hex(digest: &Digest) -> String {
    digest.iter().fold(String::with_capacity(40), |mut out, word| {
        let _ = write!(out, "{word:08x}");
        out
    })
}
