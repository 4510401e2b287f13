//! The resource-group index (`rindex`): a flat system file holding one
//! fixed-length `struct gfs2_rindex` record per resource group.

use super::be32;
use super::be64;
use super::RgrpDescriptor;

/// Size of one `gfs2_rindex` record.
pub const RINDEX_RECORD_LEN: usize = 96;

const OFF_ADDR: usize = 0;
const OFF_LENGTH: usize = 8;
const OFF_DATA0: usize = 16;
const OFF_DATA: usize = 24;

/// Parses every whole `gfs2_rindex` record out of the rindex file's raw
/// bytes, in on-disk (and therefore ascending address) order.
pub fn parse_all(buf: &[u8]) -> Vec<RgrpDescriptor> {
    buf.chunks_exact(RINDEX_RECORD_LEN)
        .map(|rec| RgrpDescriptor {
            addr: be64(rec, OFF_ADDR),
            length: be32(rec, OFF_LENGTH),
            data_start: be64(rec, OFF_DATA0),
            data_count: be32(rec, OFF_DATA),
        })
        .filter(|rgd| rgd.length > 0)
        .collect()
}
