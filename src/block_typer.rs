//! C1: classifies a raw block buffer into a [`BlockKind`] and the number of
//! leading bytes that must be archived for it, grounded on the
//! `block_is_a_*`/`get_bitmap_count`-style dispatch in
//! `gfs2/edit/savemeta.c`'s `block_type`/`save_block` path.

use crate::gfs2::metatype;
use crate::gfs2::DinodeView;
use crate::gfs2::MetaHeader;
use crate::gfs2::DINODE_HEADER_LEN;

use crate::gfs2::superblock::SB_RECORD_LEN;

/// The kind of a single block, as determined purely from its own header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Superblock,
    Rgrp,
    RgrpBitmap,
    Dinode,
    Indirect,
    Leaf,
    JournaledData,
    LogHeader,
    LogDescriptor,
    EaHeader,
    EaData,
    Unknown,
}

/// Extra context `classify` needs to apply the dinode and log-header length
/// policy from the component design; everything else is derivable from the
/// block's own header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    pub bsize: u32,
    pub gfs1: bool,
    pub is_system: bool,
    pub is_journal_owned: bool,
}

/// Inspects `buf` (the full `bsize` bytes of a block) and returns its kind
/// plus the number of leading bytes significant enough to archive.
///
/// `dinode` is `Some` only when the caller already knows `buf` decodes as a
/// dinode (the Inode Walker parses it once and passes the view back in,
/// rather than re-parsing here).
pub fn classify(buf: &[u8], ctx: ClassifyContext, dinode: Option<&DinodeView>) -> (BlockKind, usize) {
    let bsize = ctx.bsize as usize;
    let mh = match MetaHeader::parse(buf) {
        Some(mh) => mh,
        None => return (BlockKind::Unknown, bsize),
    };

    match mh.mh_type {
        metatype::SB => (BlockKind::Superblock, SB_RECORD_LEN),
        metatype::RG => (BlockKind::Rgrp, bsize),
        metatype::RB => (BlockKind::RgrpBitmap, bsize),
        metatype::DI => {
            let len = dinode_length(dinode, ctx);
            (BlockKind::Dinode, len)
        }
        metatype::IN => (BlockKind::Indirect, bsize),
        metatype::LF => (BlockKind::Leaf, bsize),
        metatype::JD => (BlockKind::JournaledData, bsize),
        metatype::LH => {
            let len = if ctx.gfs1 { 512 } else { LOG_HEADER_RECORD_LEN };
            (BlockKind::LogHeader, len.min(bsize))
        }
        metatype::LD => (BlockKind::LogDescriptor, bsize),
        metatype::EA => (BlockKind::EaHeader, bsize),
        metatype::ED => (BlockKind::EaData, bsize),
        _ => (BlockKind::Unknown, bsize),
    }
}

/// Size of the fixed `struct gfs2_log_header` record in the modern variant.
const LOG_HEADER_RECORD_LEN: usize = 64;

fn dinode_length(dinode: Option<&DinodeView>, ctx: ClassifyContext) -> usize {
    let bsize = ctx.bsize as usize;
    let full = match dinode {
        Some(dn) => {
            dn.height > 0
                || dn.is_dir()
                || dn.is_link()
                || dn.is_system()
                || ctx.is_system
                || ctx.is_journal_owned
        }
        None => ctx.is_system || ctx.is_journal_owned,
    };
    if full {
        bsize
    } else {
        DINODE_HEADER_LEN
    }
}

/// Whether a block with no recognizable metadata header is still worth
/// archiving in full: true when it's owned by something in the system-file
/// set (journal data, per_node children, the handful of well-known system
/// inodes), false for ordinary user-file data.
pub fn unknown_significant_length(bsize: u32, owned_by_system: bool) -> usize {
    if owned_by_system {
        bsize as usize
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfs2::GFS2_MAGIC;

    fn header(buf: &mut [u8], mh_type: u32) {
        buf[0..4].copy_from_slice(&GFS2_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&mh_type.to_be_bytes());
    }

    #[test]
    fn unknown_block_has_no_magic() {
        let buf = vec![0u8; 512];
        let ctx = ClassifyContext {
            bsize: 512,
            ..Default::default()
        };
        assert_eq!(classify(&buf, ctx, None), (BlockKind::Unknown, 512));
    }

    #[test]
    fn dinode_user_file_trims_to_header_length() {
        let mut buf = vec![0u8; 4096];
        header(&mut buf, metatype::DI);
        let ctx = ClassifyContext {
            bsize: 4096,
            ..Default::default()
        };
        let dn = DinodeView {
            height: 0,
            ..Default::default()
        };
        let (kind, len) = classify(&buf, ctx, Some(&dn));
        assert_eq!(kind, BlockKind::Dinode);
        assert_eq!(len, DINODE_HEADER_LEN);
    }

    #[test]
    fn dinode_with_height_archives_full_block() {
        let mut buf = vec![0u8; 4096];
        header(&mut buf, metatype::DI);
        let ctx = ClassifyContext {
            bsize: 4096,
            ..Default::default()
        };
        let dn = DinodeView {
            height: 2,
            ..Default::default()
        };
        let (_, len) = classify(&buf, ctx, Some(&dn));
        assert_eq!(len, 4096);
    }

    #[test]
    fn legacy_log_header_uses_512_byte_length() {
        let mut buf = vec![0u8; 4096];
        header(&mut buf, metatype::LH);
        let ctx = ClassifyContext {
            bsize: 4096,
            gfs1: true,
            ..Default::default()
        };
        let (kind, len) = classify(&buf, ctx, None);
        assert_eq!(kind, BlockKind::LogHeader);
        assert_eq!(len, 512);
    }

    #[test]
    fn unknown_owned_by_system_archives_full_block() {
        assert_eq!(unknown_significant_length(4096, true), 4096);
        assert_eq!(unknown_significant_length(4096, false), 0);
    }
}
