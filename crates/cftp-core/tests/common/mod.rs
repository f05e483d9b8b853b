//! Common test utilities for CFTP integration tests.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use cftp_core::connection::Channel;

/// Per-operation timeout used by tests that are not about timeouts.
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1.len(), content2.len(), "File sizes differ");
    assert!(content1 == content2, "File contents differ");
}

/// Two connected in-memory channels: (sender side, receiver side).
pub fn channel_pair() -> (Channel<DuplexStream>, Channel<DuplexStream>) {
    let (a, b) = tokio::io::duplex(256 * 1024);
    (
        Channel::new(a, Some(IO_TIMEOUT)),
        Channel::new(b, Some(IO_TIMEOUT)),
    )
}

/// Stream wrapper that inverts one byte of everything written through it.
///
/// The byte at absolute write offset `target` is XORed with `0xFF`; all
/// other bytes pass unchanged.
#[derive(Debug)]
pub struct CorruptingStream<S> {
    inner: S,
    written: u64,
    target: u64,
}

impl<S> CorruptingStream<S> {
    pub fn new(inner: S, target: u64) -> Self {
        Self {
            inner,
            written: 0,
            target,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CorruptingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CorruptingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let start = self.written;
        let end = start + buf.len() as u64;

        let poll = if (start..end).contains(&self.target) {
            let mut copy = buf.to_vec();
            let at = usize::try_from(self.target - start).expect("offset fits in usize");
            copy[at] ^= 0xFF;
            Pin::new(&mut self.inner).poll_write(cx, &copy)
        } else {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        };

        if let Poll::Ready(Ok(n)) = &poll {
            self.written += *n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
