//! C6: the archive header and per-block record wire format, grounded on
//! `savemeta.c`'s `struct savemeta_header`/`savemetaf` packed-record
//! writer. Big-endian throughout; no padding between fields or records.

use crate::error::Error;
use crate::error::Result;
use crate::sink::Sink;
use crate::source::Source;
use crate::util::get_timestamp;

/// Tags an archive written by this codec. Distinct from [`crate::gfs2::GFS2_MAGIC`]
/// (the filesystem's own on-disk magic) even though the two numbers look
/// alike by construction: this one stamps the *archive container*, that one
/// stamps *filesystem metadata blocks*.
pub const ARCHIVE_MAGIC: u32 = 0x0117_1970;

/// The only archive format this build understands.
pub const ARCHIVE_FORMAT: u32 = 1;

/// Fixed size of the archive header on the wire.
pub const HEADER_LEN: usize = 128;

const RESERVED_LEN: usize = 104;

/// The parsed 128-byte archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub format: u32,
    pub time: u64,
    pub fs_bytes: u64,
}

/// Writes the 128-byte archive header, stamping the current wall-clock time.
pub fn write_header(sink: &mut Sink, fs_bytes: u64) -> Result<()> {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&ARCHIVE_MAGIC.to_be_bytes());
    buf[4..8].copy_from_slice(&ARCHIVE_FORMAT.to_be_bytes());
    buf[8..16].copy_from_slice(&get_timestamp().as_secs().to_be_bytes());
    buf[16..24].copy_from_slice(&fs_bytes.to_be_bytes());
    // buf[24..128] stays zeroed: the 104 reserved bytes.
    sink.write(&buf)
}

/// Writes one archive record for block `addr`. `buf` is the full block
/// image; `len` is the caller-computed significant length (from C1/C3's
/// policy). On a raw sink, trailing NUL bytes are trimmed from `buf[..len]`
/// first; if that empties the payload, nothing is written at all — per the
/// design, `save_buf` with a zero effective length is a no-op, never an
/// empty record.
pub fn write_record(sink: &mut Sink, addr: u64, buf: &[u8], len: usize) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let payload = &buf[..len];
    let trimmed = if sink.is_raw() {
        trim_trailing_nuls(payload)
    } else {
        payload
    };
    if trimmed.is_empty() {
        return Ok(());
    }

    let mut header = [0u8; 10];
    header[0..8].copy_from_slice(&addr.to_be_bytes());
    header[8..10].copy_from_slice(&(trimmed.len() as u16).to_be_bytes());
    sink.write(&header)?;
    sink.write(trimmed)
}

fn trim_trailing_nuls(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &buf[..end]
}

/// Reads the archive header from `source`, if present. Returns `None` (and
/// leaves the source's cursor untouched) when the magic doesn't match,
/// signaling a legacy headerless archive that the caller must scan for its
/// superblock record instead.
pub fn read_header(source: &mut Source) -> Result<Option<ArchiveHeader>> {
    source.refill(HEADER_LEN)?;
    if source.available() < 4 {
        return Ok(None);
    }
    let magic = u32::from_be_bytes(source.peek(4).try_into().unwrap());
    if magic != ARCHIVE_MAGIC {
        return Ok(None);
    }
    if source.available() < HEADER_LEN {
        return Err(Error::StreamRead("truncated archive header".into()));
    }
    let raw = source.consume(HEADER_LEN);
    let format = u32::from_be_bytes(raw[4..8].try_into().unwrap());
    if format > ARCHIVE_FORMAT {
        return Err(Error::UnsupportedFormat {
            found: format,
            supported: ARCHIVE_FORMAT,
        });
    }
    let time = u64::from_be_bytes(raw[8..16].try_into().unwrap());
    let fs_bytes = u64::from_be_bytes(raw[16..24].try_into().unwrap());
    let _reserved_len = RESERVED_LEN;
    Ok(Some(ArchiveHeader { format, time, fs_bytes }))
}

/// Reads one record: the packed `{addr, siglen}` header followed by its
/// payload. Returns `None` cleanly at end of stream. `fssize`/`bsize`, once
/// known, are used to validate P1/P2; pass `None` before the superblock has
/// been parsed.
pub fn read_record(source: &mut Source, fssize: Option<u64>, bsize: Option<u32>) -> Result<Option<(u64, Vec<u8>)>> {
    source.refill(10)?;
    if source.available() < 10 {
        if source.eof() {
            return Ok(None);
        }
        return Err(Error::StreamRead("truncated record header".into()));
    }
    let hdr = source.consume(10).to_vec();
    let addr = u64::from_be_bytes(hdr[0..8].try_into().unwrap());
    let siglen = u16::from_be_bytes(hdr[8..10].try_into().unwrap());

    if let Some(bsize) = bsize {
        if siglen as u32 > bsize {
            return Err(Error::BadRecord { addr, siglen, bsize });
        }
    }
    if let Some(fssize) = fssize {
        if addr >= fssize {
            return Err(Error::DestinationTooSmall { dest_blocks: fssize, block: addr });
        }
    }

    source.refill(siglen as usize)?;
    if source.available() < siglen as usize {
        return Err(Error::StreamRead("truncated record payload".into()));
    }
    let payload = source.consume(siglen as usize).to_vec();
    Ok(Some((addr, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;
    use std::io::Write;

    fn round_trip_sink() -> (Sink, std::fs::File) {
        let f = tempfile::tempfile().unwrap();
        let clone = f.try_clone().unwrap();
        (Sink::raw(f), clone)
    }

    #[test]
    fn header_round_trips() {
        let (mut sink, mut f) = round_trip_sink();
        write_header(&mut sink, 123_456).unwrap();
        sink.close().unwrap();
        f.rewind().unwrap();
        let mut source = Source::open(f).unwrap();
        let header = read_header(&mut source).unwrap().unwrap();
        assert_eq!(header.format, ARCHIVE_FORMAT);
        assert_eq!(header.fs_bytes, 123_456);
    }

    #[test]
    fn missing_header_returns_none_for_legacy_archives() {
        let f = tempfile::tempfile().unwrap();
        let mut clone = f.try_clone().unwrap();
        clone.write_all(&[1u8, 2, 3, 4]).unwrap();
        clone.rewind().unwrap();
        let mut source = Source::open(clone).unwrap();
        assert!(read_header(&mut source).unwrap().is_none());
    }

    #[test]
    fn record_trims_trailing_nuls_on_raw_sink() {
        let (mut sink, mut f) = round_trip_sink();
        let mut payload = vec![0u8; 64];
        payload[0..4].copy_from_slice(b"meta");
        write_record(&mut sink, 42, &payload, 64).unwrap();
        sink.close().unwrap();
        f.rewind().unwrap();
        let mut source = Source::open(f).unwrap();
        let (addr, data) = read_record(&mut source, None, None).unwrap().unwrap();
        assert_eq!(addr, 42);
        assert_eq!(data, b"meta");
    }

    #[test]
    fn zero_length_record_emits_nothing() {
        let (mut sink, mut f) = round_trip_sink();
        write_record(&mut sink, 1, &[0u8; 16], 0).unwrap();
        sink.close().unwrap();
        f.rewind().unwrap();
        let mut source = Source::open(f).unwrap();
        assert!(read_record(&mut source, None, None).unwrap().is_none());
    }

    #[test]
    fn rejects_record_addressing_beyond_fssize() {
        let (mut sink, mut f) = round_trip_sink();
        write_record(&mut sink, 9999, b"xx", 2).unwrap();
        sink.close().unwrap();
        f.rewind().unwrap();
        let mut source = Source::open(f).unwrap();
        let err = read_record(&mut source, Some(100), None).unwrap_err();
        assert!(matches!(err, Error::DestinationTooSmall { .. }));
    }

    #[test]
    fn rejects_siglen_exceeding_bsize() {
        let (mut sink, mut f) = round_trip_sink();
        write_record(&mut sink, 1, b"0123456789", 10).unwrap();
        sink.close().unwrap();
        f.rewind().unwrap();
        let mut source = Source::open(f).unwrap();
        let err = read_record(&mut source, None, Some(4)).unwrap_err();
        assert!(matches!(err, Error::BadRecord { .. }));
    }
}
