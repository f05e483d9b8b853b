//! # CFTP Core Library
//!
//! `cftp-core` implements the Cluster File Transfer Protocol: a frame-based
//! protocol for moving a single file over one TCP connection between a
//! sender (client) and a receiver (server).
//!
//! ## Features
//!
//! - **Fixed 32-byte frames**: explicit big-endian codec for all ten frame kinds
//! - **Session state machines**: DISCOVERY → NEGOTIATION → TRANSFER → TEARDOWN
//! - **Chunked transfer**: per-chunk acknowledgment with bounded retry and resync
//! - **End-to-end integrity**: SHA-1 digest announced up front, verified after teardown
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`connection`] - Transport channel, TCP connect/listen helpers
//! - [`crypto`] - Whole-file integrity digests
//! - [`mod@file`] - File records, chunk reading and writing
//! - [`protocol`] - CFTP wire format (frame codec, session parameters)
//! - [`server`] - Sequential accept loop for receivers
//! - [`session`] - Sender and receiver state machines
//! - [`transfer`] - Chunk transfer engine
//!
//! ## Example
//!
//! ```rust,ignore
//! use cftp_core::connection::{self, Channel};
//! use cftp_core::file::FileRecord;
//! use cftp_core::session::SenderSession;
//!
//! let addr = "10.0.0.5:9400".parse()?;
//! let stream = connection::connect(addr, config.network.connect_timeout).await?;
//! let record = FileRecord::from_path(path, config.transfer.chunk_size).await?;
//! let channel = Channel::new(stream, config.transfer.io_timeout());
//! let report = SenderSession::new(channel, record).run().await;
//! println!("{}", if report.success { "done" } else { "failed" });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod file;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transfer;

pub use error::{Error, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default receiver port (TCP)
pub const DEFAULT_PORT: u16 = 9400;

/// Default chunk size for file transfers (64 KB)
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Largest chunk size a receiver accepts by default (16 MB)
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Number of failed attempts per chunk before the sender gives up
pub const MAX_RETRIES: u32 = 10;
