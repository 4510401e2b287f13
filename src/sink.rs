//! C4: the write side of the archive, grounded on `savemeta.c`'s raw-fd vs
//! `gzopen`-backed output switch (`out_fd`/`gzout`(`savemetaf`). Using
//! `flate2`'s `GzEncoder` in place of hand-rolled zlib bindings is the one
//! substitution the design calls for.

use std::fs::File;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Error;
use crate::error::Result;

/// Write-side abstraction over a raw file descriptor or a gzip stream.
/// Compression level `0` selects the raw backend; `1..=9` selects gzip at
/// that level.
pub enum Sink {
    Raw(File),
    Gzip(GzEncoder<File>),
}

impl Sink {
    pub fn raw(file: File) -> Self {
        Sink::Raw(file)
    }

    pub fn gzip(file: File, level: u32) -> Self {
        Sink::Gzip(GzEncoder::new(file, Compression::new(level.clamp(1, 9))))
    }

    /// True for the raw backend, where `write_record` (C6) must trim
    /// trailing NUL bytes itself; compressed backends skip that step since
    /// the codec handles redundancy on its own.
    pub fn is_raw(&self) -> bool {
        matches!(self, Sink::Raw(_))
    }

    /// Writes `buf` in full, returning a [`Error::StreamWrite`] diagnostic
    /// on any I/O failure.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let res = match self {
            Sink::Raw(f) => f.write_all(buf),
            Sink::Gzip(enc) => enc.write_all(buf),
        };
        res.map_err(|e| Error::StreamWrite(e.to_string()))
    }

    /// Flushes and finalizes the stream. Must be called before dropping a
    /// gzip sink to emit the trailer.
    pub fn close(self) -> Result<()> {
        match self {
            Sink::Raw(mut f) => f.flush().map_err(|e| Error::StreamWrite(e.to_string())),
            Sink::Gzip(enc) => enc
                .finish()
                .map(|_| ())
                .map_err(|e| Error::StreamWrite(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::io::Seek;
    use std::io::SeekFrom;

    #[test]
    fn raw_sink_writes_bytes_verbatim() {
        let file = tempfile::tempfile().unwrap();
        let mut sink = Sink::raw(file);
        assert!(sink.is_raw());
        sink.write(b"hello").unwrap();
        let Sink::Raw(mut f) = sink else { unreachable!() };
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        f.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn gzip_sink_round_trips() {
        let file = tempfile::tempfile().unwrap();
        let mut sink = Sink::gzip(file, 6);
        assert!(!sink.is_raw());
        sink.write(b"metadata payload").unwrap();
        let Sink::Gzip(enc) = sink else { unreachable!() };
        let mut f = enc.finish().unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(f);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"metadata payload");
    }
}
