//! Error taxonomy for the save/restore pipeline.
//!
//! Follows the fatal/recoverable split from the design: anything returned
//! as `Err` here is fatal to the orchestrator that produced it. Recoverable
//! and advisory conditions (a bad indirect pointer, a short read on a
//! best-effort range) never become an `Error` — the producing component logs
//! them with the `log` crate and continues, per the design's error handling
//! rules.

use std::io;
use std::path::PathBuf;

/// Errors that abort a save or restore run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("can't open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("no valid superblock found in metadata file")]
    NoSuperblock,

    #[error("invalid superblock: {0}")]
    BadSuperblock(String),

    #[error("archive format {found} is newer than the format this build understands ({supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    #[error("file system is too small to restore this metadata: destination has {dest_blocks} blocks, record addresses a block at {block}")]
    DestinationTooSmall { dest_blocks: u64, block: u64 },

    #[error("failed to read compressed stream: {0}")]
    StreamRead(String),

    #[error("failed to write compressed stream: {0}")]
    StreamWrite(String),

    #[error("short write to {path}: wrote {wrote} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        wrote: usize,
        expected: usize,
    },

    #[error("bad record: siglen {siglen} exceeds block size {bsize} for block {addr}")]
    BadRecord {
        addr: u64,
        siglen: u16,
        bsize: u32,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
