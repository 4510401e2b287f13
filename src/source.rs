//! C5: the read side of the archive, grounded on `savemeta.c`'s
//! try-bzip2-then-gzip detection (`gzopen` can't tell a plain file from a
//! corrupted gzip file, so it's tried last) and its 2&nbsp;MiB refill
//! buffer. `flate2`'s `GzDecoder` does not transparently pass through
//! non-gzip input the way the C library's `gzread` does, so that
//! passthrough behavior is reimplemented here via magic-byte sniffing
//! instead.

use std::fs::File;
use std::io::Read;
use std::io::Seek;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;

use crate::error::Error;
use crate::error::Result;

const REFILL_CAP: usize = 2 * 1024 * 1024;

const BZIP2_MAGIC: &[u8] = b"BZh";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

enum Backend {
    Raw(File),
    Gzip(GzDecoder<File>),
    Bzip2(BzDecoder<File>),
}

impl Read for Backend {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Backend::Raw(f) => f.read(buf),
            Backend::Gzip(d) => d.read(buf),
            Backend::Bzip2(d) => d.read(buf),
        }
    }
}

/// Read-side abstraction with compression auto-detection and an internal
/// ring/compaction buffer, so callers can ask for "at least N bytes" without
/// worrying about partial reads from the underlying backend.
pub struct Source {
    backend: Backend,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl Source {
    /// Opens `file`, sniffing its first bytes to choose bzip2, gzip, or raw
    /// passthrough, in that order.
    pub fn open(mut file: File) -> Result<Self> {
        let mut magic = [0u8; 3];
        let n = file
            .read(&mut magic)
            .map_err(|e| Error::StreamRead(e.to_string()))?;
        file.rewind().map_err(|e| Error::StreamRead(e.to_string()))?;

        let backend = if n >= 3 && &magic[..3] == BZIP2_MAGIC {
            Backend::Bzip2(BzDecoder::new(file))
        } else if n >= 2 && magic[..2] == GZIP_MAGIC {
            Backend::Gzip(GzDecoder::new(file))
        } else {
            Backend::Raw(file)
        };

        Ok(Self {
            backend,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        })
    }

    /// Ensures at least `required` unread bytes are available (unless EOF is
    /// reached first), compacting the buffer's already-consumed prefix out
    /// of the way before pulling more from the backend.
    pub fn refill(&mut self, required: usize) -> Result<()> {
        if self.buf.len() - self.pos >= required || self.eof {
            return Ok(());
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        let mut chunk = vec![0u8; REFILL_CAP];
        while self.buf.len() < required && !self.eof {
            let n = self
                .backend
                .read(&mut chunk)
                .map_err(|e| Error::StreamRead(e.to_string()))?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Returns the unread bytes currently buffered, without consuming them.
    pub fn peek(&self, len: usize) -> &[u8] {
        let end = (self.pos + len).min(self.buf.len());
        &self.buf[self.pos..end]
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn eof(&self) -> bool {
        self.eof && self.available() == 0
    }

    /// Consumes `len` bytes from the front of the unread region. Panics if
    /// fewer than `len` bytes are available; callers must `refill` first.
    pub fn consume(&mut self, len: usize) -> &[u8] {
        let start = self.pos;
        self.pos += len;
        &self.buf[start..self.pos]
    }
}
