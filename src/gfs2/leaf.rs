//! Directory leaf blocks (`struct gfs2_leaf`). Leaves form singly linked
//! chains via `lf_next` for hash-bucket overflow, per
//! `save_leaf_chain` in `gfs2/edit/savemeta.c`.

use super::be64;
use super::META_HEADER_LEN;

/// Size of the leaf header (common metadata header plus the leaf-specific
/// fields) before dirents begin.
pub const LEAF_HEADER_LEN: usize = 56;

const OFF_LF_NEXT: usize = META_HEADER_LEN + 8;

/// Reads the `lf_next` chain pointer out of a leaf block buffer. Zero means
/// "end of chain".
pub fn next_ptr(buf: &[u8]) -> u64 {
    if buf.len() < OFF_LF_NEXT + 8 {
        return 0;
    }
    be64(buf, OFF_LF_NEXT)
}
